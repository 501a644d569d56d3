//! Relational backend.
//!
//! One row per build event in a single `builds` table; the medium's
//! auto-increment counter supplies build ids and aggregation happens in
//! SQL. Every operation is a single statement on a pooled connection,
//! bounded by a request-scoped timeout.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tally_core::{Build, ProjectSummary};

use crate::{Storage, StorageError};

const MAX_CONNECTIONS: u32 = 25;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS builds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        build_id TEXT NOT NULL,
        started INTEGER NOT NULL,
        finished INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS builds_name_idx ON builds (name)",
];

pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Open the database, creating the file and schema if needed.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::ConfigurationMissing(format!("invalid database url: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| unavailable("connect", e))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| unavailable("connect", e))?;
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqlStore {
    async fn start_build(&self, name: &str, build_id: &str) -> Result<i64, StorageError> {
        let started = Utc::now().timestamp();
        let insert = sqlx::query_scalar(
            "INSERT INTO builds (name, build_id, started) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(name)
        .bind(build_id)
        .bind(started)
        .fetch_one(&self.pool);

        let id: i64 = bounded("start_build", WRITE_TIMEOUT, insert)
            .await
            .map_err(|e| write_failed("start_build", name, e))?;
        Ok(id)
    }

    async fn finish_build(&self, name: &str, build_id: &str) -> Result<(), StorageError> {
        // Every row matching the pair is stamped, so duplicate starts
        // are all closed retroactively; a repeat finish overwrites the
        // previous finish timestamp.
        let finished = Utc::now().timestamp();
        let update =
            sqlx::query("UPDATE builds SET finished = ?1 WHERE name = ?2 AND build_id = ?3")
                .bind(finished)
                .bind(name)
                .bind(build_id)
                .execute(&self.pool);

        let result = bounded("finish_build", WRITE_TIMEOUT, update)
            .await
            .map_err(|e| write_failed("finish_build", name, e))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let ping = sqlx::query("SELECT 1").fetch_one(&self.pool);
        bounded("health_check", HEALTH_TIMEOUT, ping)
            .await
            .map_err(|e| unavailable("health_check", e))?;
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StorageError> {
        // SQLite picks the bare columns from the row achieving
        // MAX(started), so each group yields the latest build alongside
        // the group count. Tie-break between equal timestamps is
        // medium-defined.
        let query = sqlx::query(
            "SELECT id, name, build_id, MAX(started) AS started, finished,
                    COUNT(*) AS build_count
             FROM builds
             GROUP BY name",
        )
        .fetch_all(&self.pool);

        let rows = bounded("list_projects", READ_TIMEOUT, query)
            .await
            .map_err(|e| unavailable("list_projects", e))?;

        let mut projects = Vec::with_capacity(rows.len());
        for row in rows {
            let build = build_from_row(&row)?;
            let build_count: i64 = row
                .try_get("build_count")
                .map_err(|e| unavailable("list_projects", e))?;
            projects.push(ProjectSummary {
                name: build.name.clone(),
                latest_build: build,
                build_count: build_count.max(0) as u64,
            });
        }
        Ok(projects)
    }

    async fn project_builds(&self, name: &str) -> Result<Vec<Build>, StorageError> {
        let query = sqlx::query(
            "SELECT id, name, build_id, started, finished
             FROM builds
             WHERE name = ?1
             ORDER BY started DESC, id DESC",
        )
        .bind(name)
        .fetch_all(&self.pool);

        let rows = bounded("project_builds", READ_TIMEOUT, query)
            .await
            .map_err(|e| unavailable("project_builds", e))?;

        rows.iter().map(build_from_row).collect()
    }
}

fn build_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Build, StorageError> {
    let id: i64 = row.try_get("id").map_err(row_decode)?;
    let name: String = row.try_get("name").map_err(row_decode)?;
    let build_id: String = row.try_get("build_id").map_err(row_decode)?;
    let started: i64 = row.try_get("started").map_err(row_decode)?;
    let finished: Option<i64> = row.try_get("finished").map_err(row_decode)?;

    let started = timestamp(&name, started)?;
    let finished = finished.map(|secs| timestamp(&name, secs)).transpose()?;
    Ok(Build::from_parts(id, name, build_id, started, finished))
}

fn timestamp(name: &str, secs: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::DecodeFailed {
            name: name.to_string(),
            message: format!("timestamp {secs} out of range"),
        })
}

fn row_decode(err: sqlx::Error) -> StorageError {
    StorageError::DecodeFailed {
        name: "builds row".to_string(),
        message: err.to_string(),
    }
}

fn unavailable(op: &'static str, err: sqlx::Error) -> StorageError {
    StorageError::Unavailable {
        op,
        message: err.to_string(),
    }
}

fn write_failed(op: &'static str, name: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            unavailable(op, err)
        }
        other => StorageError::WriteFailed {
            op,
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

/// Run a database future under the operation's timeout, folding the
/// elapsed case into an I/O-shaped error for uniform classification.
async fn bounded<T>(
    op: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, sqlx::Error> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{op} timed out after {}s", limit.as_secs()),
        ))),
    }
}
