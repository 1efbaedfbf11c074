//! Versioned document store
//!
//! The whole system state lives in one [`Document`]. The live copy is held in
//! memory; a commit is first saved to a [`Backend`] as a full snapshot and
//! only then replaces the live copy, so a failed save changes nothing. Slot mutations go through [`DocumentStore::transact`], an
//! optimistic compare-and-swap on the slot's version stamp that retries when
//! another writer committed to the same slot in between.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use common::error::DatabaseError;

use crate::models::{Account, ArchivedRoster, AttendanceRecord, HistoryEntry, LectureSession, SlotKey};

pub mod file;
pub mod postgres;

pub use file::FileBackend;
pub use postgres::PgBackend;

/// Custom error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("slot {slot} still contended after {attempts} attempts")]
    Contention { slot: String, attempts: u32 },
}

/// State of one slot: its current session and the ledger since that session started
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotState {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub session: Option<LectureSession>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
}

/// The persisted document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotState>,
    #[serde(default)]
    pub histories: BTreeMap<String, Vec<HistoryEntry>>,
    #[serde(default)]
    pub archive: BTreeMap<String, ArchivedRoster>,
}

/// Writes outside the slot that a transaction wants committed with it
#[derive(Debug, Default)]
pub struct Effects {
    history: Vec<(String, HistoryEntry)>,
    archive: Vec<ArchivedRoster>,
}

impl Effects {
    pub fn record_history(&mut self, username: impl Into<String>, entry: HistoryEntry) {
        self.history.push((username.into(), entry));
    }

    pub fn archive(&mut self, roster: ArchivedRoster) {
        self.archive.push(roster);
    }

    fn is_empty(&self) -> bool {
        self.history.is_empty() && self.archive.is_empty()
    }
}

/// Where snapshots are persisted
pub enum Backend {
    File(FileBackend),
    Postgres(PgBackend),
}

impl Backend {
    async fn load(&self) -> Result<Document, StoreError> {
        match self {
            Backend::File(backend) => backend.load().await,
            Backend::Postgres(backend) => backend.load().await,
        }
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        match self {
            Backend::File(backend) => backend.save(document).await,
            Backend::Postgres(backend) => backend.save(document).await,
        }
    }
}

struct Inner {
    document: RwLock<Document>,
    backend: Backend,
    /// Held for the whole of a commit, backend save included
    commit: Mutex<()>,
    max_retries: u32,
}

/// Shared handle to the document store
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<Inner>,
}

impl DocumentStore {
    /// Load the document from `backend` and wrap it in a store
    pub async fn open(backend: Backend, max_retries: u32) -> Result<Self, StoreError> {
        let document = backend.load().await?;
        info!(
            "Store opened at version {} with {} slots and {} accounts",
            document.version,
            document.slots.len(),
            document.accounts.len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                commit: Mutex::new(()),
                document: RwLock::new(document),
                backend,
                max_retries: max_retries.max(1),
            }),
        })
    }

    /// Snapshot of a slot, including its version stamp
    pub async fn slot(&self, slot: &SlotKey) -> SlotState {
        let document = self.inner.document.read().await;
        document
            .slots
            .get(&slot.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every slot that has ever held a session
    pub async fn slots(&self) -> Vec<SlotState> {
        let document = self.inner.document.read().await;
        document.slots.values().cloned().collect()
    }

    /// Run `f` against a copy of the slot and commit the result if the slot
    /// was not changed by someone else meanwhile.
    ///
    /// `f` may run more than once and must not have side effects other than
    /// on its arguments. When `f` fails nothing is committed. When it leaves
    /// the slot untouched and records no effects the commit is skipped.
    pub async fn transact<T, E, F>(&self, slot: &SlotKey, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut SlotState, &mut Effects) -> Result<T, E>,
        E: From<StoreError>,
    {
        let key = slot.to_string();
        let attempts = self.inner.max_retries;

        for attempt in 1..=attempts {
            let snapshot = self.slot(slot).await;
            let mut staged = snapshot.clone();
            let mut effects = Effects::default();

            let output = f(&mut staged, &mut effects)?;
            if staged == snapshot && effects.is_empty() {
                return Ok(output);
            }

            if self
                .compare_and_swap(&key, snapshot.version, staged, effects)
                .await?
            {
                return Ok(output);
            }
            debug!(slot = %key, attempt, "slot version moved, retrying");
        }

        warn!(slot = %key, attempts, "giving up on contended slot");
        Err(StoreError::Contention {
            slot: key,
            attempts,
        }
        .into())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: u64,
        mut staged: SlotState,
        effects: Effects,
    ) -> Result<bool, StoreError> {
        let _commit = self.inner.commit.lock().await;

        let mut next = {
            let document = self.inner.document.read().await;
            let current = document.slots.get(key).map_or(0, |s| s.version);
            if current != expected {
                return Ok(false);
            }
            document.clone()
        };

        staged.version = expected + 1;
        next.slots.insert(key.to_string(), staged);
        for (username, entry) in effects.history {
            next.histories.entry(username).or_default().push(entry);
        }
        for roster in effects.archive {
            next.archive.insert(roster.session_id.clone(), roster);
        }
        next.version += 1;

        self.publish(next).await?;
        Ok(true)
    }

    /// Write `next` to the backend, then make it the live document. Callers
    /// hold the commit lock. A failed save leaves the live document as it was.
    async fn publish(&self, next: Document) -> Result<(), StoreError> {
        self.inner.backend.save(&next).await.inspect_err(|e| {
            warn!(version = next.version, "commit not saved, discarding: {}", e)
        })?;
        *self.inner.document.write().await = next;
        Ok(())
    }

    pub async fn account(&self, username: &str) -> Option<Account> {
        let document = self.inner.document.read().await;
        document
            .accounts
            .iter()
            .find(|a| a.username == username)
            .cloned()
    }

    pub async fn has_accounts(&self) -> bool {
        !self.inner.document.read().await.accounts.is_empty()
    }

    /// Insert an account. Returns `false` when the username is taken.
    pub async fn insert_account(&self, account: Account) -> Result<bool, StoreError> {
        let _commit = self.inner.commit.lock().await;

        let mut next = {
            let document = self.inner.document.read().await;
            if document.accounts.iter().any(|a| a.username == account.username) {
                return Ok(false);
            }
            document.clone()
        };
        next.accounts.push(account);
        next.version += 1;

        self.publish(next).await?;
        Ok(true)
    }

    pub async fn history(&self, username: &str) -> Vec<HistoryEntry> {
        let document = self.inner.document.read().await;
        document.histories.get(username).cloned().unwrap_or_default()
    }

    pub async fn archived(&self, session_id: &str) -> Option<ArchivedRoster> {
        let document = self.inner.document.read().await;
        document.archive.get(session_id).cloned()
    }

    /// Version of the document currently held in memory
    pub async fn version(&self) -> u64 {
        self.inner.document.read().await.version
    }
}
