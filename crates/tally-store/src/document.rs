//! Versioned key/value documents.
//!
//! The namespace backend persists every project's latest build inside
//! one document, so each write is a read-modify-write of the whole
//! body. [`DocumentStore::replace`] rejects writes against a stale
//! version, which is what keeps concurrent writers from silently
//! dropping each other's keys.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::StorageError;

/// A whole-document snapshot: a version counter plus the key/value
/// body (`project name -> JSON-encoded build record`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDocument {
    /// Version observed at load time; `replace` refuses to apply a
    /// snapshot whose version no longer matches the stored one.
    pub version: u64,

    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl VersionedDocument {
    pub fn empty() -> Self {
        Self {
            version: 0,
            entries: BTreeMap::new(),
        }
    }
}

/// Access to one externally stored versioned document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current snapshot, or `None` if the document does not exist yet.
    async fn load(&self) -> Result<Option<VersionedDocument>, StorageError>;

    /// Get the document, creating it empty if missing.
    async fn ensure(&self) -> Result<VersionedDocument, StorageError>;

    /// Persist a modified snapshot. Returns `false` without writing
    /// when the stored version has moved past `doc.version`; the
    /// caller re-reads and retries.
    async fn replace(&self, doc: &VersionedDocument) -> Result<bool, StorageError>;
}

/// In-memory document store for tests.
pub struct MemoryDocumentStore {
    doc: RwLock<Option<VersionedDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            doc: RwLock::new(None),
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self) -> Result<Option<VersionedDocument>, StorageError> {
        Ok(self.doc.read().await.clone())
    }

    async fn ensure(&self) -> Result<VersionedDocument, StorageError> {
        let mut slot = self.doc.write().await;
        Ok(slot.get_or_insert_with(VersionedDocument::empty).clone())
    }

    async fn replace(&self, doc: &VersionedDocument) -> Result<bool, StorageError> {
        let mut slot = self.doc.write().await;
        let current = slot.as_ref().map(|d| d.version).unwrap_or(0);
        if current != doc.version {
            return Ok(false);
        }
        *slot = Some(VersionedDocument {
            version: doc.version + 1,
            entries: doc.entries.clone(),
        });
        Ok(true)
    }
}

/// Production document store: one JSON file under the data root.
///
/// Writes go through a temp file and rename so readers never observe a
/// partial document; the version check and the write are serialized by
/// an internal lock so the compare-and-swap is atomic in-process.
///
/// The lock does not reach across processes: the document must be
/// owned by a single `tallyd` instance. Two processes sharing a data
/// root can interleave between the version check and the rename and
/// lose each other's updates.
pub struct FileDocumentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDocumentStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_snapshot(&self) -> Result<Option<VersionedDocument>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let doc = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::DecodeFailed {
                        name: self.path.display().to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(Some(doc))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_unavailable("load", e)),
        }
    }

    async fn write_snapshot(&self, doc: &VersionedDocument) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_unavailable("replace", e))?;
        }
        let json = serde_json::to_vec_pretty(doc).map_err(|e| StorageError::WriteFailed {
            op: "replace",
            name: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_unavailable("replace", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_unavailable("replace", e))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn load(&self) -> Result<Option<VersionedDocument>, StorageError> {
        self.read_snapshot().await
    }

    async fn ensure(&self) -> Result<VersionedDocument, StorageError> {
        let _guard = self.write_lock.lock().await;
        if let Some(doc) = self.read_snapshot().await? {
            return Ok(doc);
        }
        let doc = VersionedDocument::empty();
        self.write_snapshot(&doc).await?;
        Ok(doc)
    }

    async fn replace(&self, doc: &VersionedDocument) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .read_snapshot()
            .await?
            .map(|d| d.version)
            .unwrap_or(0);
        if current != doc.version {
            return Ok(false);
        }
        self.write_snapshot(&VersionedDocument {
            version: doc.version + 1,
            entries: doc.entries.clone(),
        })
        .await?;
        Ok(true)
    }
}

fn io_unavailable(op: &'static str, err: std::io::Error) -> StorageError {
    StorageError::Unavailable {
        op,
        message: err.to_string(),
    }
}
