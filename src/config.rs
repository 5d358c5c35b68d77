use serde::Deserialize;
use time::Duration;
use tracing::warn;

use crate::auth::session::SessionPolicy;

/// Google OAuth client credentials. All three values must be present for the
/// google strategy to be registered.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub touch_interval_minutes: i64,
}

impl SessionConfig {
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            ttl: Duration::minutes(self.ttl_minutes),
            touch_interval: Duration::minutes(self.touch_interval_minutes),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
    pub google: Option<GoogleConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let session = SessionConfig {
            // 14 days of idle life, refreshed at most once a day.
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
            touch_interval_minutes: std::env::var("SESSION_TOUCH_INTERVAL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        let google = match (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
            std::env::var("GOOGLE_CALLBACK_URL"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(callback_url))
                if !client_id.is_empty() && !client_secret.is_empty() && !callback_url.is_empty() =>
            {
                Some(GoogleConfig {
                    client_id,
                    client_secret,
                    callback_url,
                })
            }
            _ => {
                warn!(
                    "Google OAuth credentials not found; google authentication will not be available"
                );
                None
            }
        };
        Ok(Self {
            database_url,
            session,
            google,
        })
    }
}
