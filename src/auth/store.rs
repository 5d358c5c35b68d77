use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::user::{Identity, NewUser, User, UserRow};

/// Postgres SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Persistence contract for user records. Uniqueness of `email` and
/// `google_id` is enforced by the store itself, atomically at create time;
/// callers may probe first for a friendlier message but must not rely on it.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a locally-registered user by email.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find a google-federated user by provider id.
    async fn find_by_google_id(&self, google_id: &str) -> AuthResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;

    /// Combined duplicate probe used by registration: matches the value
    /// against both the email and google id columns.
    async fn find_conflicting(&self, value: &str) -> AuthResult<Option<User>>;

    /// Persist a draft. Fails with `DuplicateIdentity` when the email or
    /// google id is already taken, including when two creates race.
    async fn create(&self, draft: NewUser) -> AuthResult<User>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str = "id, auth_method, email, password_hash, google_id, \
     display_name, first_name, last_name, profile_image, created_at";

fn map_create_error(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return AuthError::DuplicateIdentity;
        }
    }
    AuthError::Persistence(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND auth_method = 'local'"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_google_id(&self, google_id: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = $1"
        ))
        .bind(google_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_conflicting(&self, value: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR google_id = $1"
        ))
        .bind(value)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn create(&self, draft: NewUser) -> AuthResult<User> {
        let (email, password_hash, google_id) = match &draft.identity {
            Identity::Local {
                email,
                password_hash,
            } => (Some(email.as_str()), Some(password_hash.as_str()), None),
            Identity::Google { google_id } => (None, None, Some(google_id.as_str())),
        };

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users \
                 (id, auth_method, email, password_hash, google_id, \
                  display_name, first_name, last_name, profile_image) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(draft.identity.method())
        .bind(email)
        .bind(password_hash)
        .bind(google_id)
        .bind(&draft.display_name)
        .bind(&draft.first_name)
        .bind(&draft.last_name)
        .bind(&draft.profile_image)
        .fetch_one(&self.db)
        .await
        .map_err(map_create_error)?;

        User::try_from(row)
    }
}

/// In-memory store with the same uniqueness semantics as the Postgres one.
/// Backs `AppState::fake()` and the unit tests; production always runs on
/// `PgUserStore`.
#[derive(Default)]
pub struct MemoryUserStore {
    users: std::sync::Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users.iter().find(|u| u.email() == Some(email)).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .iter()
            .find(|u| u.google_id() == Some(google_id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_conflicting(&self, value: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .iter()
            .find(|u| u.email() == Some(value) || u.google_id() == Some(value))
            .cloned())
    }

    async fn create(&self, draft: NewUser) -> AuthResult<User> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let taken = match &draft.identity {
            Identity::Local { email, .. } => {
                users.iter().any(|u| u.email() == Some(email.as_str()))
            }
            Identity::Google { google_id } => users
                .iter()
                .any(|u| u.google_id() == Some(google_id.as_str())),
        };
        if taken {
            return Err(AuthError::DuplicateIdentity);
        }
        let user = User {
            id: Uuid::new_v4(),
            identity: draft.identity,
            display_name: draft.display_name,
            first_name: draft.first_name,
            last_name: draft.last_name,
            profile_image: draft.profile_image,
            created_at: time::OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }
}
