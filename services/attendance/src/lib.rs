//! Live-classroom attendance service
//!
//! A presenter opens a time-boxed session on a `(course, section)` slot,
//! students check in with the session's ticket, and the presenter ends the
//! session or removes attendees. Every mutation is committed through a
//! versioned [`store::DocumentStore`].

pub mod accounts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod rate_limiter;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod store;
pub mod ticket;
pub mod tokens;
pub mod validation;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use common::{cache::RedisConfig, cache::RedisPool, database::DatabaseConfig};

use crate::{
    accounts::AccountService,
    catalog::Catalog,
    config::{AppConfig, StoreBackend, TokenBackend},
    ledger::AttendanceLedger,
    rate_limiter::RateLimiter,
    sessions::SessionManager,
    state::{AppState, SessionDefaults},
    store::{Backend, DocumentStore, FileBackend, PgBackend},
    tokens::{MemoryTokens, RedisTokens, TokenStore},
};

pub use routes::create_router;

/// Open the configured store backend
pub async fn open_store(config: &AppConfig) -> anyhow::Result<DocumentStore> {
    let backend = match config.store.backend {
        StoreBackend::File => {
            info!("Using file store at {}", config.store.path);
            Backend::File(FileBackend::new(&config.store.path))
        }
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("store.database_url is not set")?;
            let db_config = DatabaseConfig::new(url, config.store.max_connections);
            let backend = PgBackend::connect(&db_config, &config.store.document_id).await?;
            info!("Using postgres store, document {}", config.store.document_id);
            Backend::Postgres(backend)
        }
    };

    Ok(DocumentStore::open(backend, config.store.max_retries).await?)
}

/// Build the configured token store
pub async fn open_tokens(config: &AppConfig) -> anyhow::Result<TokenStore> {
    let ttl = config.tokens.ttl();
    match config.tokens.backend {
        TokenBackend::Memory => Ok(TokenStore::Memory(MemoryTokens::new(ttl))),
        TokenBackend::Redis => {
            let pool = RedisPool::new(&RedisConfig::new(&config.tokens.redis_url))?;
            if !pool.health_check().await? {
                anyhow::bail!("Redis at {} is not answering", config.tokens.redis_url);
            }
            info!("Using redis token store at {}", config.tokens.redis_url);
            Ok(TokenStore::Redis(RedisTokens::new(pool, ttl)))
        }
    }
}

/// Wire the services on top of an opened store and token store
pub async fn build_state(
    config: &AppConfig,
    store: DocumentStore,
    tokens: TokenStore,
) -> anyhow::Result<AppState> {
    let catalog = Arc::new(Catalog::standard());
    let accounts = AccountService::new(
        store.clone(),
        tokens.clone(),
        RateLimiter::new((&config.login).into()),
        catalog.clone(),
    );

    if let (Some(username), Some(password)) =
        (&config.bootstrap.username, &config.bootstrap.password)
    {
        accounts.seed_bootstrap(username, password).await?;
    }

    Ok(AppState {
        sessions: SessionManager::new(store.clone(), catalog.clone()),
        ledger: AttendanceLedger::new(store),
        accounts,
        tokens,
        catalog,
        defaults: SessionDefaults {
            duration_minutes: config.session.default_duration_minutes,
            replace_active: config.session.replace_active,
        },
    })
}
