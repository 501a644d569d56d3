//! Build records and per-project summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One build event.
///
/// Created by a start operation, mutated exactly once by a finish
/// operation. `duration_seconds` is derived from the two timestamps and
/// recomputed on every read, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    /// Backend-assigned identifier (auto-increment row id, or a
    /// timestamp-derived id in the namespace backend).
    pub id: i64,

    /// Project the build belongs to.
    pub name: String,

    /// Externally supplied build/run identifier, scoped to `name`.
    pub build_id: String,

    /// Set by the backend at start time.
    pub started: DateTime<Utc>,

    /// Absent while the build is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,

    /// `finished - started` in whole seconds; present iff `finished` is.
    #[serde(
        default,
        rename = "duration_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<i64>,
}

impl Build {
    /// Assemble a build from stored fields, deriving the duration.
    pub fn from_parts(
        id: i64,
        name: String,
        build_id: String,
        started: DateTime<Utc>,
        finished: Option<DateTime<Utc>>,
    ) -> Self {
        let duration = finished.map(|f| f.timestamp() - started.timestamp());
        Self {
            id,
            name,
            build_id,
            started,
            finished,
            duration,
        }
    }

    /// A build still waiting for its finish event.
    pub fn in_progress(id: i64, name: String, build_id: String, started: DateTime<Utc>) -> Self {
        Self::from_parts(id, name, build_id, started, None)
    }

    pub fn is_running(&self) -> bool {
        self.finished.is_none()
    }
}

/// Read-side projection: the latest build for a project plus how many
/// builds the backend has recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,

    pub latest_build: Build,

    /// Total builds ever started for this project. The namespace
    /// backend keeps no history and always reports 1.
    #[serde(default, skip_serializing_if = "count_is_zero")]
    pub build_count: u64,
}

fn count_is_zero(count: &u64) -> bool {
    *count == 0
}
