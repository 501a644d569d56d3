//! Namespace backend.
//!
//! At most one build record per project name, all of them inside a
//! single versioned document. Every mutation is a read-modify-write of
//! the whole document, retried when the version check rejects a stale
//! snapshot. No history: each start discards the project's previous
//! record, and `build_count` is always 1.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{Build, ProjectSummary};

use crate::document::{DocumentStore, VersionedDocument};
use crate::{Storage, StorageError};

const OP_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts before a version conflict becomes a `WriteFailed`. Each
/// conflict means some other writer committed, so this also bounds the
/// burst of concurrent writers the backend absorbs without failing.
const MAX_WRITE_ATTEMPTS: usize = 16;

/// The record kept per project inside the document. The duration is
/// derived on read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBuild {
    id: i64,
    name: String,
    build_id: String,
    started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished: Option<DateTime<Utc>>,
}

impl StoredBuild {
    fn into_build(self) -> Build {
        Build::from_parts(self.id, self.name, self.build_id, self.started, self.finished)
    }
}

pub struct NamespaceStore {
    docs: Arc<dyn DocumentStore>,
}

impl NamespaceStore {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl Storage for NamespaceStore {
    async fn start_build(&self, name: &str, build_id: &str) -> Result<i64, StorageError> {
        let op = async {
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let mut doc = self.docs.ensure().await?;
                let now = now_secs();
                // Unix-time id: unique enough per overwrite cycle, and
                // only one record per name survives anyway.
                let record = StoredBuild {
                    id: now.timestamp(),
                    name: name.to_string(),
                    build_id: build_id.to_string(),
                    started: now,
                    finished: None,
                };
                let id = record.id;
                doc.entries
                    .insert(name.to_string(), encode(name, &record)?);
                if self.docs.replace(&doc).await? {
                    return Ok(id);
                }
                tracing::debug!(name, "document version moved, retrying start_build");
            }
            Err(retries_exhausted("start_build", name))
        };
        bounded("start_build", OP_TIMEOUT, op).await
    }

    async fn finish_build(&self, name: &str, build_id: &str) -> Result<(), StorageError> {
        let op = async {
            for _ in 0..MAX_WRITE_ATTEMPTS {
                let mut doc = self
                    .docs
                    .load()
                    .await?
                    .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
                let raw = doc
                    .entries
                    .get(name)
                    .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
                let mut record = decode(name, raw)?;
                if record.build_id != build_id {
                    return Err(StorageError::Mismatch {
                        name: name.to_string(),
                        stored: record.build_id,
                        supplied: build_id.to_string(),
                    });
                }
                record.finished = Some(now_secs());
                doc.entries
                    .insert(name.to_string(), encode(name, &record)?);
                if self.docs.replace(&doc).await? {
                    return Ok(());
                }
                tracing::debug!(name, "document version moved, retrying finish_build");
            }
            Err(retries_exhausted("finish_build", name))
        };
        bounded("finish_build", OP_TIMEOUT, op).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        // Effectful: creates the backing document when it is missing.
        bounded("health_check", HEALTH_TIMEOUT, async {
            self.docs.ensure().await.map(|_| ())
        })
        .await
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StorageError> {
        let op = async {
            let doc = match self.docs.load().await? {
                Some(doc) => doc,
                None => return Ok(Vec::new()),
            };
            Ok(summaries_from(&doc))
        };
        bounded("list_projects", OP_TIMEOUT, op).await
    }

    async fn project_builds(&self, name: &str) -> Result<Vec<Build>, StorageError> {
        let op = async {
            let doc = self
                .docs
                .load()
                .await?
                .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
            let raw = doc
                .entries
                .get(name)
                .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
            Ok(vec![decode(name, raw)?.into_build()])
        };
        bounded("project_builds", OP_TIMEOUT, op).await
    }
}

fn summaries_from(doc: &VersionedDocument) -> Vec<ProjectSummary> {
    let mut projects = Vec::with_capacity(doc.entries.len());
    for (name, raw) in &doc.entries {
        // Undecodable entries are skipped, not fatal: one tampered key
        // should not take the whole listing down.
        match decode(name, raw) {
            Ok(record) => projects.push(ProjectSummary {
                name: name.clone(),
                latest_build: record.into_build(),
                build_count: 1,
            }),
            Err(e) => tracing::warn!(name, error = %e, "skipping undecodable build record"),
        }
    }
    projects
}

fn encode(name: &str, record: &StoredBuild) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(|e| StorageError::WriteFailed {
        op: "encode",
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn decode(name: &str, raw: &str) -> Result<StoredBuild, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::DecodeFailed {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Current time truncated to whole seconds, so a stored timestamp
/// re-reads exactly equal and durations stay integral.
fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

fn retries_exhausted(op: &'static str, name: &str) -> StorageError {
    StorageError::WriteFailed {
        op,
        name: name.to_string(),
        message: format!("document version conflicts exhausted {MAX_WRITE_ATTEMPTS} attempts"),
    }
}

async fn bounded<T>(
    op: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Unavailable {
            op,
            message: format!("timed out after {}s", limit.as_secs()),
        }),
    }
}
