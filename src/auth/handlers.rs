use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthPage, FieldError, Locals, LoginForm, LoginFormData, RegisterForm, RegisterFormData},
        error::{AuthError, AuthResult},
        extractors::{expired_session_cookie, session_cookie, SESSION_COOKIE},
        password::{hash_password, MIN_PASSWORD_LEN},
        store::UserStore,
        strategy::{self, Credentials, Strategy},
        user::{normalize_email, Identity, NewUser},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/auth/choose", get(choose_page))
        .route("/auth/google", get(google_redirect))
        .route("/google/callback", get(google_callback))
        .route("/login-failure", get(login_failure))
        .route("/logout", get(logout))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn form_response<F: Serialize>(status: StatusCode, page: AuthPage<F>) -> Response {
    (status, Json(page)).into_response()
}

fn field_errors(messages: Vec<String>) -> Vec<FieldError> {
    messages.into_iter().map(|msg| FieldError { msg }).collect()
}

fn register_view(
    messages: Vec<String>,
    form_data: RegisterFormData,
    has_google_auth: bool,
) -> AuthPage<RegisterFormData> {
    AuthPage {
        locals: Locals::register(),
        errors: field_errors(messages),
        form_data,
        has_google_auth,
    }
}

fn login_view(
    messages: Vec<String>,
    form_data: LoginFormData,
    has_google_auth: bool,
) -> AuthPage<LoginFormData> {
    AuthPage {
        locals: Locals::login(),
        errors: field_errors(messages),
        form_data,
        has_google_auth,
    }
}

fn unavailable_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Google OAuth is not configured. Please set GOOGLE_CLIENT_ID, \
         GOOGLE_CLIENT_SECRET and GOOGLE_CALLBACK_URL in your .env file.",
    )
        .into_response()
}

pub(crate) fn validate_registration(form: &RegisterForm) -> AuthResult<()> {
    let mut messages = Vec::new();
    if form.first_name.is_empty()
        || form.last_name.is_empty()
        || form.email.is_empty()
        || form.password.is_empty()
    {
        messages.push("Please fill in all fields".to_string());
    }
    if !form.email.is_empty() && !is_valid_email(form.email.trim()) {
        messages.push("Please enter a valid email".to_string());
    }
    if !form.password.is_empty() && form.password.len() < MIN_PASSWORD_LEN {
        messages.push(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    if form.password != form.confirm_password {
        messages.push("Passwords do not match".to_string());
    }
    if messages.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(messages))
    }
}

#[instrument(skip(state))]
pub async fn register_page(State(state): State<AppState>) -> Response {
    form_response(
        StatusCode::OK,
        register_view(Vec::new(), RegisterFormData::default(), state.has_google_auth()),
    )
}

#[instrument(skip(state, jar, form))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Response {
    let has_google = state.has_google_auth();
    let form_data = RegisterFormData {
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        email: form.email.clone(),
    };

    if let Err(AuthError::Validation(messages)) = validate_registration(&form) {
        return form_response(
            StatusCode::BAD_REQUEST,
            register_view(messages, form_data, has_google),
        );
    }

    let email = normalize_email(&form.email);

    // Friendly duplicate probe; the unique indexes are the real guard.
    match state.users.find_conflicting(&email).await {
        Ok(Some(_)) => {
            warn!("registration for an already registered email");
            return form_response(
                StatusCode::CONFLICT,
                register_view(
                    vec!["Email already registered".to_string()],
                    form_data,
                    has_google,
                ),
            );
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "duplicate probe failed");
            return form_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                register_view(
                    vec!["Registration failed. Please try again.".to_string()],
                    form_data,
                    has_google,
                ),
            );
        }
    }

    let password_hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return form_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                register_view(
                    vec!["Registration failed. Please try again.".to_string()],
                    form_data,
                    has_google,
                ),
            );
        }
    };

    let draft = NewUser {
        identity: Identity::Local {
            email,
            password_hash,
        },
        display_name: Some(format!("{} {}", form.first_name, form.last_name)),
        first_name: Some(form.first_name),
        last_name: Some(form.last_name),
        profile_image: None,
    };

    let user = match state.users.create(draft).await {
        Ok(user) => user,
        // Lost a create race after a clean probe.
        Err(AuthError::DuplicateIdentity) => {
            return form_response(
                StatusCode::CONFLICT,
                register_view(
                    vec!["Email already registered".to_string()],
                    form_data,
                    has_google,
                ),
            );
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return form_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                register_view(
                    vec!["Registration failed. Please try again.".to_string()],
                    form_data,
                    has_google,
                ),
            );
        }
    };

    // Auto login after registration.
    match state.sessions.establish(&user).await {
        Ok(token) => {
            info!(user_id = %user.id, "user registered");
            (jar.add(session_cookie(token)), Redirect::to("/dashboard")).into_response()
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "session establish failed");
            Redirect::to("/login").into_response()
        }
    }
}

#[instrument(skip(state))]
pub async fn login_page(State(state): State<AppState>) -> Response {
    form_response(
        StatusCode::OK,
        login_view(Vec::new(), LoginFormData::default(), state.has_google_auth()),
    )
}

#[instrument(skip(state, jar, form))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let has_google = state.has_google_auth();
    let form_data = LoginFormData {
        email: form.email.clone(),
    };

    let outcome: AuthResult<String> = async {
        let local = state.strategies.get(strategy::LOCAL)?;
        let user = local
            .authenticate(&Credentials::Local {
                email: form.email,
                password: form.password,
            })
            .await?;
        let token = state.sessions.establish(&user).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }
    .await;

    match outcome {
        Ok(token) => {
            (jar.add(session_cookie(token)), Redirect::to("/dashboard")).into_response()
        }
        Err(AuthError::InvalidCredentials) => form_response(
            StatusCode::UNAUTHORIZED,
            login_view(
                vec!["Invalid email or password".to_string()],
                form_data,
                has_google,
            ),
        ),
        Err(e) => {
            error!(error = %e, "login failed");
            form_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                login_view(
                    vec!["Login failed. Please try again.".to_string()],
                    form_data,
                    has_google,
                ),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChooseQuery {
    pub action: Option<String>,
}

#[instrument(skip(state))]
pub async fn choose_page(
    State(state): State<AppState>,
    Query(query): Query<ChooseQuery>,
) -> Response {
    let action = query.action.unwrap_or_else(|| "register".to_string());
    let locals = if action == "login" {
        Locals::new("Sign In - Notes App", "Login to your account")
    } else {
        Locals::new("Sign Up - Notes App", "Create a new account")
    };

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ChoosePage {
        locals: Locals,
        action: String,
        has_google_auth: bool,
    }

    Json(ChoosePage {
        locals,
        action,
        has_google_auth: state.has_google_auth(),
    })
    .into_response()
}

#[instrument(skip(state))]
pub async fn google_redirect(State(state): State<AppState>) -> Response {
    let Some(google) = state.google.as_ref() else {
        return unavailable_response();
    };
    match google.authorize_redirect() {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            error!(error = %e, "building google authorize url failed");
            Redirect::to("/login-failure").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[instrument(skip(state, jar, query))]
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(google) = state.google.as_ref() else {
        return unavailable_response();
    };

    let outcome: AuthResult<String> = async {
        if let Some(err) = query.error {
            return Err(AuthError::Provider(err));
        }
        let code = query
            .code
            .ok_or_else(|| AuthError::Provider("missing authorization code".into()))?;
        let csrf = query
            .state
            .ok_or_else(|| AuthError::Provider("missing state parameter".into()))?;
        if !google.consume_state(&csrf) {
            return Err(AuthError::Provider("unrecognized or expired state".into()));
        }

        let profile = google.exchange(&code).await?;
        let strategy = state.strategies.get(strategy::GOOGLE)?;
        let user = strategy.authenticate(&Credentials::Google(profile)).await?;
        let token = state.sessions.establish(&user).await?;
        info!(user_id = %user.id, "user logged in via google");
        Ok(token)
    }
    .await;

    match outcome {
        Ok(token) => {
            (jar.add(session_cookie(token)), Redirect::to("/dashboard")).into_response()
        }
        Err(AuthError::StrategyUnavailable(_)) => unavailable_response(),
        Err(e) => {
            warn!(error = %e, "google callback failed");
            Redirect::to("/login-failure").into_response()
        }
    }
}

pub async fn login_failure() -> Response {
    "Something went wrong...".into_response()
}

#[instrument(skip(state, jar))]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Redirect::to("/").into_response();
    };
    match state.sessions.destroy(cookie.value()).await {
        // Already-absent still counts as logged out.
        Ok(_) => (
            jar.remove(expired_session_cookie()),
            Redirect::to("/"),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "logout failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error logging out").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn valid_form() -> RegisterForm {
        RegisterForm {
            first_name: "A".into(),
            last_name: "B".into(),
            email: "a@b.com".into(),
            password: "abcdef".into(),
            confirm_password: "abcdef".into(),
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[test]
    fn validation_collects_field_messages() {
        let form = RegisterForm {
            first_name: String::new(),
            last_name: "B".into(),
            email: "not-an-email".into(),
            password: "abc".into(),
            confirm_password: "abcd".into(),
        };
        let Err(AuthError::Validation(messages)) = validate_registration(&form) else {
            panic!("expected validation failure");
        };
        assert!(messages.contains(&"Please fill in all fields".to_string()));
        assert!(messages.contains(&"Please enter a valid email".to_string()));
        assert!(messages.contains(&"Password must be at least 6 characters".to_string()));
        assert!(messages.contains(&"Passwords do not match".to_string()));
    }

    #[test]
    fn validation_accepts_a_complete_form() {
        assert!(validate_registration(&valid_form()).is_ok());
    }

    #[tokio::test]
    async fn register_rejects_short_passwords_and_keeps_the_form() {
        let state = AppState::fake();
        let mut form = valid_form();
        form.password = "abc".into();
        form.confirm_password = "abc".into();

        let response = register(State(state), CookieJar::default(), Form(form)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("Password must be at least 6 characters"));
        assert!(body.contains("\"firstName\":\"A\""));
        assert!(body.contains("\"email\":\"a@b.com\""));
        assert!(!body.contains("abc\""));
    }

    #[tokio::test]
    async fn register_establishes_a_session_and_redirects() {
        let state = AppState::fake();
        let response = register(State(state.clone()), CookieJar::default(), Form(valid_form())).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(axum::http::header::LOCATION).unwrap(),
            "/dashboard"
        );
        let set_cookie = response
            .headers()
            .get(axum::http::header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with(SESSION_COOKIE));

        let user = state
            .users
            .find_by_email("a@b.com")
            .await
            .unwrap()
            .expect("created");
        assert_eq!(user.auth_method(), "local");
        assert_ne!(user.identity, Identity::Local {
            email: "a@b.com".into(),
            password_hash: "abcdef".into(),
        });
    }

    #[tokio::test]
    async fn duplicate_registration_re_renders_with_the_form_preserved() {
        let state = AppState::fake();
        register(State(state.clone()), CookieJar::default(), Form(valid_form())).await;

        let mut second = valid_form();
        second.first_name = "Other".into();
        let response = register(State(state), CookieJar::default(), Form(second)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_string(response).await;
        assert!(body.contains("Email already registered"));
        assert!(body.contains("\"firstName\":\"Other\""));
        assert!(!body.contains("abcdef"));
    }

    #[tokio::test]
    async fn login_rejections_use_one_generic_message() {
        let state = AppState::fake();
        register(State(state.clone()), CookieJar::default(), Form(valid_form())).await;

        let wrong_password = login(
            State(state.clone()),
            CookieJar::default(),
            Form(LoginForm {
                email: "a@b.com".into(),
                password: "wrong!".into(),
            }),
        )
        .await;
        let unknown_email = login(
            State(state),
            CookieJar::default(),
            Form(LoginForm {
                email: "nobody@b.com".into(),
                password: "wrong!".into(),
            }),
        )
        .await;

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
        let first = body_string(wrong_password).await.replace("a@b.com", "");
        let second = body_string(unknown_email).await.replace("nobody@b.com", "");
        assert_eq!(first, second);
        assert!(first.contains("Invalid email or password"));
    }

    #[tokio::test]
    async fn login_success_sets_the_session_cookie() {
        let state = AppState::fake();
        register(State(state.clone()), CookieJar::default(), Form(valid_form())).await;

        let response = login(
            State(state),
            CookieJar::default(),
            Form(LoginForm {
                email: " A@B.COM ".into(),
                password: "abcdef".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response
            .headers()
            .get(axum::http::header::SET_COOKIE)
            .is_some());
    }

    #[tokio::test]
    async fn google_entry_points_report_unavailable_when_unconfigured() {
        let state = AppState::fake();
        let redirect = google_redirect(State(state.clone())).await;
        assert_eq!(redirect.status(), StatusCode::SERVICE_UNAVAILABLE);

        let callback = google_callback(
            State(state),
            CookieJar::default(),
            Query(CallbackQuery {
                code: Some("code".into()),
                state: Some("state".into()),
                error: None,
            }),
        )
        .await;
        assert_eq!(callback.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn register_page_reports_google_availability() {
        let response = register_page(State(AppState::fake())).await;
        let body = body_string(response).await;
        assert!(body.contains("\"hasGoogleAuth\":false"));
    }
}
