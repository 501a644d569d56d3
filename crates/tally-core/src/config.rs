//! Service configuration.
//!
//! Settings come from an optional TOML file, overridden by environment
//! variables and CLI flags. The storage section selects which backend a
//! process serves with for its whole lifetime; there is no runtime
//! switching.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//!
//! [storage]
//! mode = "relational"
//! database_url = "sqlite:/var/lib/tally/builds.db"
//! ```
//!
//! Namespace mode stores one JSON document per namespace under a data
//! root:
//!
//! ```toml
//! [storage]
//! mode = "namespace"
//! namespace = "default"
//! document = "tally"
//! # data_root = "/var/lib/tally"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("could not determine a data directory; set storage.data_root")]
    NoDataDir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            storage: StorageConfig::default(),
        }
    }
}

/// Which persistence medium backs the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One row per build event in a relational table; full history.
    #[default]
    Relational,
    /// One record per project in a shared versioned document; no history.
    Namespace,
}

impl StorageMode {
    pub fn label(self) -> &'static str {
        match self {
            StorageMode::Relational => "relational",
            StorageMode::Namespace => "namespace",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub mode: StorageMode,

    /// Connection string for the relational backend. Required in
    /// relational mode; `DATABASE_URL` fills it when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Scope identifier for the namespace backend.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the backing document within the namespace.
    #[serde(default = "default_document")]
    pub document: String,

    /// Directory the namespace backend keeps its documents under.
    /// Defaults to the platform data dir. Must not be shared by
    /// concurrently running server processes; document writes are only
    /// coordinated within one process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            database_url: None,
            namespace: default_namespace(),
            document: default_document(),
            data_root: None,
        }
    }
}

impl ServiceConfig {
    /// Load from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill gaps from the process environment (`DATABASE_URL`).
    pub fn apply_env(&mut self) {
        if self.storage.database_url.is_none() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                if !url.is_empty() {
                    self.storage.database_url = Some(url);
                }
            }
        }
    }
}

impl StorageConfig {
    /// Path of the backing document: `<root>/<namespace>/<document>.json`.
    pub fn document_path(&self) -> Result<PathBuf, ConfigError> {
        let root = match &self.data_root {
            Some(root) => root.clone(),
            None => dirs::data_local_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("tally"),
        };
        Ok(root.join(&self.namespace).join(format!("{}.json", self.document)))
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_document() -> String {
    "tally".to_string()
}
