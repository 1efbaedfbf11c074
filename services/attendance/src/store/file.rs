//! JSON file backend
//!
//! Snapshots are written to a sibling `.tmp` file and renamed over the
//! document, so an interrupted write never leaves a half-written document.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use super::{Document, StoreError};
use crate::models::now_millis;

pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Read the document. A missing file is created empty. An unreadable one
    /// is moved aside and replaced with an empty document.
    pub async fn load(&self) -> Result<Document, StoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store document at {}, creating one", self.path.display());
                let document = Document::default();
                self.save(&document).await?;
                return Ok(document);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Document>(&raw) {
            Ok(document) => Ok(document),
            Err(e) => {
                let quarantine = self.sibling(&format!(".corrupt-{}", now_millis()));
                error!(
                    "Store document {} is unreadable ({}); moved to {} and starting empty. \
                     All sessions, attendance and history it held are lost",
                    self.path.display(),
                    e,
                    quarantine.display()
                );
                fs::rename(&self.path, &quarantine).await?;

                let document = Document::default();
                self.save(&document).await?;
                Ok(document)
            }
        }
    }

    pub async fn save(&self, document: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.sibling(".tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
