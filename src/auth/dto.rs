use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::user::User;

/// Page metadata passed to the rendering collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct Locals {
    pub title: String,
    pub description: String,
}

impl Locals {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn register() -> Self {
        Self::new("Register - Notes App", "Create a new account")
    }

    pub fn login() -> Self {
        Self::new("Login - Notes App", "Login to your account")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub msg: String,
}

/// The view-model bag every auth form renders from. `form_data` carries the
/// fields worth preserving across a failed attempt; passwords are never part
/// of it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPage<F: Serialize> {
    pub locals: Locals,
    pub errors: Vec<FieldError>,
    pub form_data: F,
    pub has_google_auth: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFormData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LoginFormData {
    pub email: String,
}

/// Registration form body. Missing fields default to empty so validation can
/// answer with field messages instead of a deserialization error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// What the rendering collaborator may see of a user. No password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub auth_method: &'static str,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            auth_method: user.auth_method(),
            email: user.email().map(str::to_string),
            display_name: user.display_name.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            profile_image: user.profile_image.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::auth::user::Identity;
    use time::OffsetDateTime;

    #[test]
    fn auth_page_serializes_camel_case() {
        let page = AuthPage {
            locals: Locals::register(),
            errors: vec![FieldError {
                msg: "Please fill in all fields".into(),
            }],
            form_data: RegisterFormData {
                first_name: "A".into(),
                last_name: "B".into(),
                email: "a@b.com".into(),
            },
            has_google_auth: false,
        };
        let json = serde_json::to_string(&page).unwrap();
        assert!(json.contains("\"formData\""));
        assert!(json.contains("\"hasGoogleAuth\":false"));
        assert!(json.contains("\"firstName\":\"A\""));
        assert!(!json.contains("password"));
    }

    #[test]
    fn user_view_never_exposes_the_hash() {
        let hash = hash_password("abcdef").unwrap();
        let user = User {
            id: Uuid::new_v4(),
            identity: Identity::Local {
                email: "a@b.com".into(),
                password_hash: hash.clone(),
            },
            display_name: Some("A B".into()),
            first_name: Some("A".into()),
            last_name: Some("B".into()),
            profile_image: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&UserView::from(&user)).unwrap();
        assert!(json.contains("a@b.com"));
        assert!(!json.contains(&hash));
    }
}
