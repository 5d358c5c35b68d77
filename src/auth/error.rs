use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Everything that can go wrong between a credential arriving and a session
/// existing. All variants are recoverable at the request level; handlers
/// convert them to a response and the process keeps serving.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad input shape; one message per failed field check.
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    /// Unknown email and wrong password collapse into this one variant so the
    /// response cannot reveal which check failed.
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// An email or google id is already claimed by another account.
    #[error("Email already registered")]
    DuplicateIdentity,
    /// The requested strategy is not configured for this deployment.
    #[error("{0} authentication is not configured")]
    StrategyUnavailable(&'static str),
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("password hashing error: {0}")]
    Hash(String),
    #[error("could not end session")]
    SessionDestroy,
    /// The OAuth provider rejected or garbled the exchange.
    #[error("authentication provider error: {0}")]
    Provider(String),
}
