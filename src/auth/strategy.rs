use std::collections::HashMap;
use std::sync::Arc;

use axum::async_trait;
use tracing::{info, warn};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::store::UserStore;
use crate::auth::user::{normalize_email, Identity, NewUser, User};

pub const LOCAL: &str = "local";
pub const GOOGLE: &str = "google";

/// Profile handed back by the provider after its redirect/callback exchange.
#[derive(Debug, Clone)]
pub struct GoogleProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

/// Input accepted by a strategy, one variant per entry point.
#[derive(Debug, Clone)]
pub enum Credentials {
    Local { email: String, password: String },
    Google(GoogleProfile),
}

/// A pluggable way of turning credentials into a verified user.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn authenticate(&self, credentials: &Credentials) -> AuthResult<User>;
}

impl std::fmt::Debug for dyn Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name()).finish()
    }
}

/// Email/password verification against locally-registered accounts.
pub struct LocalStrategy {
    users: Arc<dyn UserStore>,
}

impl LocalStrategy {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Strategy for LocalStrategy {
    fn name(&self) -> &'static str {
        LOCAL
    }

    async fn authenticate(&self, credentials: &Credentials) -> AuthResult<User> {
        let Credentials::Local { email, password } = credentials else {
            // Routing through the registry keeps the variants aligned;
            // anything else is a rejection, not a panic.
            return Err(AuthError::InvalidCredentials);
        };
        let email = normalize_email(email);

        // Unknown email and wrong password take the same exit so the
        // response cannot be used to enumerate accounts.
        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!("login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !user.verify_password(password)? {
            warn!(user_id = %user.id, "login attempt with invalid password");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }
}

/// Trusts the provider profile: an already-seen google id logs in, an unseen
/// one provisions a fresh account. Absence is never a failure on this path.
pub struct GoogleStrategy {
    users: Arc<dyn UserStore>,
}

impl GoogleStrategy {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Strategy for GoogleStrategy {
    fn name(&self) -> &'static str {
        GOOGLE
    }

    async fn authenticate(&self, credentials: &Credentials) -> AuthResult<User> {
        let Credentials::Google(profile) = credentials else {
            return Err(AuthError::Provider(
                "google strategy received non-google credentials".into(),
            ));
        };

        if let Some(user) = self.users.find_by_google_id(&profile.id).await? {
            return Ok(user);
        }

        let draft = NewUser {
            identity: Identity::Google {
                google_id: profile.id.clone(),
            },
            display_name: profile.display_name.clone(),
            first_name: profile.given_name.clone(),
            last_name: profile.family_name.clone(),
            profile_image: profile.picture.clone(),
        };
        match self.users.create(draft).await {
            Ok(user) => {
                info!(user_id = %user.id, "provisioned user from google profile");
                Ok(user)
            }
            // Two callbacks for the same new google id can race; the loser
            // re-fetches the winner's row and treats it as found.
            Err(AuthError::DuplicateIdentity) => self
                .users
                .find_by_google_id(&profile.id)
                .await?
                .ok_or(AuthError::DuplicateIdentity),
            Err(e) => Err(e),
        }
    }
}

/// The closed set of strategies this deployment is configured for, built once
/// at startup and shared behind `AppState`.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    /// An unregistered name is a deployment-configuration gap, reported as
    /// `StrategyUnavailable` rather than a credential failure.
    pub fn get(&self, name: &'static str) -> AuthResult<Arc<dyn Strategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or(AuthError::StrategyUnavailable(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }
}
