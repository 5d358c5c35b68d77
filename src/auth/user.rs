use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::password;

/// The identity half of a user record. Exactly one variant is populated per
/// account, fixed at creation; a local account can never turn into a google
/// one or vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Local {
        email: String,
        password_hash: String,
    },
    Google {
        google_id: String,
    },
}

impl Identity {
    pub fn method(&self) -> &'static str {
        match self {
            Identity::Local { .. } => "local",
            Identity::Google { .. } => "google",
        }
    }
}

/// A persisted user. `id` is the only value that ever goes into a session.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub identity: Identity,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn auth_method(&self) -> &'static str {
        self.identity.method()
    }

    pub fn email(&self) -> Option<&str> {
        match &self.identity {
            Identity::Local { email, .. } => Some(email),
            Identity::Google { .. } => None,
        }
    }

    pub fn google_id(&self) -> Option<&str> {
        match &self.identity {
            Identity::Local { .. } => None,
            Identity::Google { google_id } => Some(google_id),
        }
    }

    /// Compare a plaintext candidate against the stored hash. Accounts
    /// federated through google carry no password and never match.
    pub fn verify_password(&self, candidate: &str) -> AuthResult<bool> {
        match &self.identity {
            Identity::Local { password_hash, .. } => {
                password::verify_password(candidate, password_hash)
            }
            Identity::Google { .. } => Ok(false),
        }
    }
}

/// Draft for a user that does not exist yet. The store assigns `id` and
/// `created_at` when persisting it.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub identity: Identity,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
}

/// Emails are stored and compared lowercased and trimmed.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Flat row shape of the `users` table. Sparse columns; the CHECK constraint
/// guarantees the populated set matches `auth_method`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub auth_method: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = AuthError;

    fn try_from(row: UserRow) -> AuthResult<User> {
        let identity = match (
            row.auth_method.as_str(),
            row.email,
            row.password_hash,
            row.google_id,
        ) {
            ("local", Some(email), Some(password_hash), None) => Identity::Local {
                email,
                password_hash,
            },
            ("google", None, None, Some(google_id)) => Identity::Google { google_id },
            (method, ..) => {
                return Err(AuthError::Persistence(sqlx::Error::Decode(
                    format!(
                        "user {} has identity columns inconsistent with auth_method '{}'",
                        row.id, method
                    )
                    .into(),
                )))
            }
        };
        Ok(User {
            id: row.id,
            identity,
            display_name: row.display_name,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_image: row.profile_image,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_row() -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            auth_method: "local".into(),
            email: Some("a@b.com".into()),
            password_hash: Some(password::hash_password("abcdef").unwrap()),
            google_id: None,
            display_name: Some("A B".into()),
            first_name: Some("A".into()),
            last_name: Some("B".into()),
            profile_image: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  A.User@Example.COM "), "a.user@example.com");
    }

    #[test]
    fn local_row_maps_to_local_identity() {
        let user = User::try_from(local_row()).expect("consistent row");
        assert_eq!(user.auth_method(), "local");
        assert_eq!(user.email(), Some("a@b.com"));
        assert_eq!(user.google_id(), None);
    }

    #[test]
    fn google_row_maps_to_google_identity() {
        let mut row = local_row();
        row.auth_method = "google".into();
        row.email = None;
        row.password_hash = None;
        row.google_id = Some("108234".into());
        let user = User::try_from(row).expect("consistent row");
        assert_eq!(user.auth_method(), "google");
        assert_eq!(user.google_id(), Some("108234"));
        assert_eq!(user.email(), None);
    }

    #[test]
    fn inconsistent_row_is_rejected() {
        let mut row = local_row();
        row.password_hash = None;
        assert!(User::try_from(row).is_err());
    }

    #[test]
    fn google_user_never_matches_a_password() {
        let user = User {
            id: Uuid::new_v4(),
            identity: Identity::Google {
                google_id: "108234".into(),
            },
            display_name: None,
            first_name: None,
            last_name: None,
            profile_image: None,
            created_at: OffsetDateTime::now_utc(),
        };
        assert!(!user.verify_password("anything").unwrap());
    }
}
