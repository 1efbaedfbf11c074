//! Accounts and login
//!
//! Passwords are stored as argon2 PHC strings. Hashing runs on the blocking
//! pool so it does not stall request handling.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{AttendanceError, AttendanceResult};
use crate::models::{Account, LoginResponse, Role};
use crate::policy;
use crate::rate_limiter::RateLimiter;
use crate::store::DocumentStore;
use crate::tokens::{AuthUser, TokenStore};
use crate::validation::{validate_allowed_sections, validate_password, validate_username};

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub allowed_sections: Vec<String>,
}

pub fn hash_password(password: &str) -> AttendanceResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AttendanceError::Internal(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password_hash: &str, password: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

async fn hash_blocking(password: String) -> AttendanceResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AttendanceError::Internal(e.to_string()))?
}

/// Account service
#[derive(Clone)]
pub struct AccountService {
    store: DocumentStore,
    tokens: TokenStore,
    rate_limiter: RateLimiter,
    catalog: Arc<Catalog>,
}

impl AccountService {
    pub fn new(
        store: DocumentStore,
        tokens: TokenStore,
        rate_limiter: RateLimiter,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            store,
            tokens,
            rate_limiter,
            catalog,
        }
    }

    /// Verify credentials and issue a bearer token
    pub async fn login(&self, username: &str, password: &str) -> AttendanceResult<LoginResponse> {
        if !self.rate_limiter.is_allowed(username).await {
            warn!("Login for {} throttled", username);
            return Err(AttendanceError::TooManyRequests);
        }

        let account = self
            .store
            .account(username)
            .await
            .ok_or(AttendanceError::Unauthorized)?;

        let hash = account.password_hash.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_password(&hash, &password))
            .await
            .map_err(|e| AttendanceError::Internal(e.to_string()))?;
        if !verified {
            warn!("Failed login for {}", username);
            return Err(AttendanceError::Unauthorized);
        }

        self.rate_limiter.reset(username).await;
        let token = self
            .tokens
            .issue(AuthUser {
                username: account.username.clone(),
                role: account.role,
            })
            .await?;

        info!("{} logged in as {}", account.username, account.role);
        Ok(LoginResponse {
            token,
            username: account.username,
            role: account.role,
            allowed_sections: account.allowed_sections,
        })
    }

    pub async fn logout(&self, token: &str) -> AttendanceResult<()> {
        self.tokens.revoke(token).await
    }

    /// Create an account. Only developers may do this.
    pub async fn create(&self, actor: &AuthUser, new: NewAccount) -> AttendanceResult<()> {
        if !policy::is_developer(actor.role) {
            return Err(AttendanceError::Forbidden(
                "only developers can create accounts".to_string(),
            ));
        }

        validate_username(&new.username).map_err(AttendanceError::Validation)?;
        validate_password(&new.password).map_err(AttendanceError::Validation)?;
        validate_allowed_sections(&new.allowed_sections, &self.catalog)
            .map_err(AttendanceError::Validation)?;

        let account = Account {
            username: new.username.clone(),
            password_hash: hash_blocking(new.password).await?,
            role: new.role,
            allowed_sections: new.allowed_sections,
        };

        if !self.store.insert_account(account).await? {
            return Err(AttendanceError::Conflict(format!(
                "account {} already exists",
                new.username
            )));
        }

        info!("{} created {} account {}", actor.username, new.role, new.username);
        Ok(())
    }

    /// Seed a developer account when the store holds none
    pub async fn seed_bootstrap(&self, username: &str, password: &str) -> AttendanceResult<bool> {
        if self.store.has_accounts().await {
            return Ok(false);
        }

        let account = Account {
            username: username.to_string(),
            password_hash: hash_blocking(password.to_string()).await?,
            role: Role::Developer,
            allowed_sections: Vec::new(),
        };
        let created = self.store.insert_account(account).await?;
        if created {
            info!("Seeded bootstrap developer account {}", username);
        }
        Ok(created)
    }
}
