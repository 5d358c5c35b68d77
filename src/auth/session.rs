use std::collections::HashMap;
use std::sync::Arc;

use axum::async_trait;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::store::UserStore;
use crate::auth::user::User;

/// Length of the opaque session token delivered to the client as a cookie.
/// 48 alphanumeric characters, drawn from the OS RNG.
const TOKEN_LEN: usize = 48;

fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// One server-side session row. Holds only the user id, never the profile
/// and never the password hash.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub touched_at: OffsetDateTime,
}

/// Raw record operations over the shared session store. The durable
/// implementation is `PgSessionStore`; rows survive process restarts and
/// Postgres row atomicity sequences concurrent operations per token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: SessionRecord) -> AuthResult<()>;
    async fn get(&self, token: &str) -> AuthResult<Option<SessionRecord>>;
    async fn touch(
        &self,
        token: &str,
        expires_at: OffsetDateTime,
        touched_at: OffsetDateTime,
    ) -> AuthResult<()>;
    /// Returns false when the token was already absent.
    async fn delete(&self, token: &str) -> AuthResult<bool>;
}

/// TTL and idle-refresh knobs, from `SessionConfig`.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub ttl: Duration,
    /// Expiry is pushed out at most once per this interval, bounding session
    /// writes under read-heavy traffic.
    pub touch_interval: Duration,
}

/// Converts a verified identity into a session token and a token back into
/// a live identity. Only the user id crosses into the store; `resolve`
/// re-fetches the full record on every request.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            store,
            users,
            policy,
        }
    }

    pub async fn establish(&self, user: &User) -> AuthResult<String> {
        let token = generate_token();
        let now = OffsetDateTime::now_utc();
        self.store
            .insert(SessionRecord {
                token: token.clone(),
                user_id: user.id,
                created_at: now,
                expires_at: now + self.policy.ttl,
                touched_at: now,
            })
            .await?;
        Ok(token)
    }

    pub async fn resolve(&self, token: &str) -> AuthResult<Option<User>> {
        let Some(record) = self.store.get(token).await? else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_utc();
        if record.expires_at <= now {
            self.store.delete(token).await?;
            return Ok(None);
        }
        if now - record.touched_at >= self.policy.touch_interval {
            // Best effort; a missed refresh only shortens the idle window.
            if let Err(e) = self
                .store
                .touch(token, now + self.policy.ttl, now)
                .await
            {
                warn!(error = %e, "session touch failed");
            }
        }
        self.users.find_by_id(record.user_id).await
    }

    pub async fn destroy(&self, token: &str) -> AuthResult<bool> {
        self.store.delete(token).await.map_err(|e| {
            error!(error = %e, "session delete failed");
            AuthError::SessionDestroy
        })
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, record: SessionRecord) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at, touched_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.token)
        .bind(record.user_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.touched_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, token: &str) -> AuthResult<Option<SessionRecord>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            r#"
            SELECT token, user_id, created_at, expires_at, touched_at
            FROM sessions
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn touch(
        &self,
        token: &str,
        expires_at: OffsetDateTime,
        touched_at: OffsetDateTime,
    ) -> AuthResult<()> {
        sqlx::query("UPDATE sessions SET expires_at = $2, touched_at = $3 WHERE token = $1")
            .bind(token)
            .bind(expires_at)
            .bind(touched_at)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> AuthResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Test-only counterpart of `PgSessionStore`; production sessions must live
/// in the shared database so they survive restarts.
#[derive(Default)]
pub struct MemorySessionStore {
    records: std::sync::Mutex<HashMap<String, SessionRecord>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: SessionRecord) -> AuthResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.token.clone(), record);
        Ok(())
    }

    async fn get(&self, token: &str) -> AuthResult<Option<SessionRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(token).cloned())
    }

    async fn touch(
        &self,
        token: &str,
        expires_at: OffsetDateTime,
        touched_at: OffsetDateTime,
    ) -> AuthResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = records.get_mut(token) {
            record.expires_at = expires_at;
            record.touched_at = touched_at;
        }
        Ok(())
    }

    async fn delete(&self, token: &str) -> AuthResult<bool> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.remove(token).is_some())
    }
}
