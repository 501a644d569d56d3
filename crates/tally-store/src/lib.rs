//! Storage backends for build tracking.
//!
//! Two interchangeable implementations of one contract: a relational
//! table with full history ([`SqlStore`]) and a single versioned
//! document holding the latest build per project ([`NamespaceStore`]).
//! Callers program against [`Storage`] exclusively; the backend is
//! chosen once at startup from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use tally_core::{Build, ProjectSummary, StorageConfig, StorageMode};
use thiserror::Error;

/// Relational backend over a SQL table.
pub mod sql;

/// Versioned key/value document plumbing.
pub mod document;

/// Namespace backend over a versioned document.
pub mod namespace;

pub use document::{DocumentStore, FileDocumentStore, MemoryDocumentStore, VersionedDocument};
pub use namespace::NamespaceStore;
pub use sql::SqlStore;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Required configuration absent at construction; fatal, never a
    /// runtime storage error.
    #[error("storage configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Persistence medium unreachable or not answering in time.
    /// Transient from the caller's point of view; never retried here.
    #[error("storage unavailable during {op}: {message}")]
    Unavailable { op: &'static str, message: String },

    /// The medium rejected a write.
    #[error("write failed during {op} for {name}: {message}")]
    WriteFailed {
        op: &'static str,
        name: String,
        message: String,
    },

    /// No build record for the requested project.
    #[error("no build found for project {0}")]
    NotFound(String),

    /// A record exists for the project but under a different build id.
    #[error("build_id mismatch for project {name}: stored {stored}, supplied {supplied}")]
    Mismatch {
        name: String,
        stored: String,
        supplied: String,
    },

    /// Stored data is not a valid serialized build record.
    #[error("stored record for {name} is not decodable: {message}")]
    DecodeFailed { name: String, message: String },
}

/// Contract both backends satisfy.
///
/// Safe to call concurrently from many tasks; every operation is
/// bounded by its own timeout. Inputs are pre-validated by the caller.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Record the start of a build and return its backend-assigned id.
    /// Duplicate `(name, build_id)` pairs are legal: the relational
    /// backend creates an independent record, the namespace backend
    /// overwrites the previous one.
    async fn start_build(&self, name: &str, build_id: &str) -> Result<i64, StorageError>;

    /// Stamp the matching record(s) as finished now. `NotFound` when
    /// nothing matches, on both backends.
    async fn finish_build(&self, name: &str, build_id: &str) -> Result<(), StorageError>;

    /// Verify the persistence medium is reachable. The namespace
    /// backend creates its backing document here when missing.
    async fn health_check(&self) -> Result<(), StorageError>;

    /// One summary per known project, order unspecified.
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StorageError>;

    /// All builds for one project, most recent first. The namespace
    /// backend returns the single retained build or `NotFound`.
    async fn project_builds(&self, name: &str) -> Result<Vec<Build>, StorageError>;
}

/// Construct the backend selected by configuration.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn Storage>, StorageError> {
    match config.mode {
        StorageMode::Relational => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                StorageError::ConfigurationMissing(
                    "relational mode needs storage.database_url or DATABASE_URL".to_string(),
                )
            })?;
            Ok(Arc::new(SqlStore::connect(url).await?))
        }
        StorageMode::Namespace => {
            let path = config
                .document_path()
                .map_err(|e| StorageError::ConfigurationMissing(e.to_string()))?;
            let docs = Arc::new(FileDocumentStore::new(path));
            Ok(Arc::new(NamespaceStore::new(docs)))
        }
    }
}
