use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use serde::Deserialize;
use tracing::debug;

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::strategy::GoogleProfile;
use crate::config::GoogleConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPES: &str = "email profile";

/// Abandoned flows keep their state token alive this long at most.
const STATE_TTL: Duration = Duration::from_secs(600);
const STATE_LEN: usize = 32;

fn provider_error(err: reqwest::Error) -> AuthError {
    AuthError::Provider(err.to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// The provider half of google sign-in: builds the authorize redirect,
/// tracks outstanding `state` tokens, and turns a callback code into a
/// `GoogleProfile` for the strategy layer. Constructed only when the
/// deployment carries google client credentials.
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    callback_url: String,
    pending: DashMap<String, Instant>,
}

impl GoogleOAuth {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            callback_url: config.callback_url.clone(),
            pending: DashMap::new(),
        }
    }

    /// Issue a fresh single-use `state` token and the provider URL to send
    /// the browser to.
    pub fn authorize_redirect(&self) -> AuthResult<String> {
        // Sweep abandoned flows before adding another entry.
        self.pending
            .retain(|_, issued| issued.elapsed() < STATE_TTL);

        let state: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();
        self.pending.insert(state.clone(), Instant::now());

        let url = reqwest::Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(url.into())
    }

    /// Validate and consume a callback `state`. Each token is good for one
    /// callback within `STATE_TTL`.
    pub fn consume_state(&self, state: &str) -> bool {
        match self.pending.remove(state) {
            Some((_, issued)) => issued.elapsed() < STATE_TTL,
            None => false,
        }
    }

    /// Exchange the authorization code for an access token and fetch the
    /// userinfo document behind it.
    pub async fn exchange(&self, code: &str) -> AuthResult<GoogleProfile> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(provider_error)?
            .error_for_status()
            .map_err(provider_error)?
            .json()
            .await
            .map_err(provider_error)?;

        let info: UserInfo = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(provider_error)?
            .error_for_status()
            .map_err(provider_error)?
            .json()
            .await
            .map_err(provider_error)?;

        debug!(google_id = %info.sub, "fetched google userinfo");
        Ok(GoogleProfile {
            id: info.sub,
            display_name: info.name,
            given_name: info.given_name,
            family_name: info.family_name,
            picture: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleOAuth {
        GoogleOAuth::new(&GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "secret-456".into(),
            callback_url: "http://localhost:59080/google/callback".into(),
        })
    }

    #[test]
    fn authorize_redirect_carries_client_and_state() {
        let google = client();
        let url = google.authorize_redirect().expect("authorize url");
        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A59080%2Fgoogle%2Fcallback"));
        assert!(url.contains("state="));
        assert!(!url.contains("secret-456"));
    }

    #[test]
    fn each_redirect_issues_a_distinct_state() {
        let google = client();
        let first = google.authorize_redirect().unwrap();
        let second = google.authorize_redirect().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn state_tokens_are_single_use() {
        let google = client();
        let url = google.authorize_redirect().unwrap();
        let state = url
            .split("state=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .expect("state param")
            .to_string();
        assert!(google.consume_state(&state));
        assert!(!google.consume_state(&state));
    }

    #[test]
    fn unknown_state_is_rejected() {
        let google = client();
        assert!(!google.consume_state("never-issued"));
    }
}
