//! Bearer token store
//!
//! Maps opaque tokens to the account that logged in. Lives for the process
//! with the memory backend, or in Redis with native key expiry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::cache::RedisPool;

use crate::error::AttendanceResult;
use crate::models::Role;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub username: String,
    pub role: Role,
}

#[derive(Debug)]
struct TokenEntry {
    user: AuthUser,
    expires_at: Instant,
}

/// In-process token table. Expired tokens are dropped when read and by
/// [`MemoryTokens::sweep`].
#[derive(Debug, Clone)]
pub struct MemoryTokens {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, TokenEntry>>>,
}

impl MemoryTokens {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn insert(&self, token: &str, user: AuthUser) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            token.to_string(),
            TokenEntry {
                user,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn resolve(&self, token: &str) -> Option<AuthUser> {
        let mut entries = self.entries.lock().await;
        let expired = entries.get(token)?.expires_at <= Instant::now();
        if expired {
            entries.remove(token);
            return None;
        }
        entries.get(token).map(|e| e.user.clone())
    }

    async fn remove(&self, token: &str) {
        self.entries.lock().await.remove(token);
    }

    /// Drop every expired token. Returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}

/// Tokens kept in Redis under `token:<token>`
#[derive(Clone)]
pub struct RedisTokens {
    pool: RedisPool,
    ttl: Duration,
}

impl RedisTokens {
    pub fn new(pool: RedisPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    fn key(token: &str) -> String {
        format!("token:{token}")
    }
}

/// Token store injected into the request handlers
#[derive(Clone)]
pub enum TokenStore {
    Memory(MemoryTokens),
    Redis(RedisTokens),
}

impl TokenStore {
    /// Issue a fresh token for `user`
    pub async fn issue(&self, user: AuthUser) -> AttendanceResult<String> {
        let token = Uuid::new_v4().to_string();

        match self {
            TokenStore::Memory(tokens) => tokens.insert(&token, user).await,
            TokenStore::Redis(tokens) => {
                let value = serde_json::to_string(&user)
                    .map_err(|e| crate::error::AttendanceError::Internal(e.to_string()))?;
                tokens
                    .pool
                    .set(&RedisTokens::key(&token), &value, Some(tokens.ttl.as_secs().max(1)))
                    .await?;
            }
        }

        Ok(token)
    }

    /// The account behind a token, if it is known and not expired
    pub async fn resolve(&self, token: &str) -> AttendanceResult<Option<AuthUser>> {
        match self {
            TokenStore::Memory(tokens) => Ok(tokens.resolve(token).await),
            TokenStore::Redis(tokens) => {
                let Some(value) = tokens.pool.get(&RedisTokens::key(token)).await? else {
                    return Ok(None);
                };
                match serde_json::from_str(&value) {
                    Ok(user) => Ok(Some(user)),
                    Err(e) => {
                        warn!("Discarding unreadable token entry: {}", e);
                        tokens.pool.delete(&RedisTokens::key(token)).await?;
                        Ok(None)
                    }
                }
            }
        }
    }

    pub async fn revoke(&self, token: &str) -> AttendanceResult<()> {
        match self {
            TokenStore::Memory(tokens) => tokens.remove(token).await,
            TokenStore::Redis(tokens) => tokens.pool.delete(&RedisTokens::key(token)).await?,
        }
        Ok(())
    }

    /// Periodically evict expired tokens. Redis expires keys on its own, so
    /// nothing is spawned for it.
    pub fn spawn_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        let TokenStore::Memory(tokens) = self else {
            return None;
        };
        let tokens = tokens.clone();
        let every = every.max(Duration::from_secs(1));

        info!("Token sweeper running every {}s", every.as_secs());
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let dropped = tokens.sweep().await;
                if dropped > 0 {
                    debug!("Swept {} expired tokens", dropped);
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            username: "L1".to_string(),
            role: Role::Lecturer,
        }
    }

    #[tokio::test]
    async fn test_issue_resolve_revoke() {
        let store = TokenStore::Memory(MemoryTokens::new(Duration::from_secs(60)));

        let token = store.issue(user()).await.unwrap();
        assert_eq!(store.resolve(&token).await.unwrap(), Some(user()));
        assert_eq!(store.resolve("nope").await.unwrap(), None);

        store.revoke(&token).await.unwrap();
        assert_eq!(store.resolve(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_token_is_evicted_on_read() {
        let tokens = MemoryTokens::new(Duration::ZERO);
        let store = TokenStore::Memory(tokens.clone());

        let token = store.issue(user()).await.unwrap();
        assert_eq!(store.resolve(&token).await.unwrap(), None);
        assert!(tokens.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_drops_expired() {
        let tokens = MemoryTokens::new(Duration::ZERO);
        let store = TokenStore::Memory(tokens.clone());
        store.issue(user()).await.unwrap();
        store.issue(user()).await.unwrap();

        assert_eq!(tokens.sweep().await, 2);
        assert_eq!(tokens.sweep().await, 0);
    }
}
