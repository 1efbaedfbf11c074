//! Application state shared across handlers

use std::sync::Arc;

use crate::{
    accounts::AccountService, catalog::Catalog, ledger::AttendanceLedger,
    sessions::SessionManager, tokens::TokenStore,
};

/// Request-time defaults taken from configuration
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub duration_minutes: i64,
    pub replace_active: bool,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub ledger: AttendanceLedger,
    pub accounts: AccountService,
    pub tokens: TokenStore,
    pub catalog: Arc<Catalog>,
    pub defaults: SessionDefaults,
}
