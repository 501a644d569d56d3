pub mod build;
pub mod config;
pub mod validate;

pub use build::{Build, ProjectSummary};
pub use config::{ConfigError, ServiceConfig, StorageConfig, StorageMode};
pub use validate::{validate_build_id, validate_name, validate_request, ValidationError};
