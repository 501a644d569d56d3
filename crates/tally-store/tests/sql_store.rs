//! Relational backend integration tests against a scratch database.

use sqlx::SqlitePool;
use tally_store::{SqlStore, Storage, StorageError};
use tempfile::TempDir;

async fn scratch_store() -> (TempDir, SqlStore, String) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("builds.db").display());
    let store = SqlStore::connect(&url).await.unwrap();
    (dir, store, url)
}

#[tokio::test]
async fn start_then_read_shows_running_build() {
    let (_dir, store, _) = scratch_store().await;

    let id = store.start_build("alpha", "run-1").await.unwrap();
    assert!(id > 0);

    let builds = store.project_builds("alpha").await.unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].id, id);
    assert_eq!(builds[0].build_id, "run-1");
    assert_eq!(builds[0].finished, None);
    assert_eq!(builds[0].duration, None);
}

#[tokio::test]
async fn finish_sets_timestamp_and_duration() {
    let (_dir, store, _) = scratch_store().await;

    store.start_build("alpha", "run-1").await.unwrap();
    store.finish_build("alpha", "run-1").await.unwrap();

    let builds = store.project_builds("alpha").await.unwrap();
    let build = &builds[0];
    let finished = build.finished.expect("finished set");
    assert!(finished >= build.started);
    assert_eq!(
        build.duration,
        Some(finished.timestamp() - build.started.timestamp())
    );
}

#[tokio::test]
async fn finish_without_matching_record_is_not_found() {
    let (_dir, store, _) = scratch_store().await;

    let err = store.finish_build("ghost", "run-1").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn repeated_finish_overwrites_timestamp() {
    let (_dir, store, _) = scratch_store().await;

    store.start_build("alpha", "run-1").await.unwrap();
    store.finish_build("alpha", "run-1").await.unwrap();
    // The pair still matches a row, so a second finish succeeds and
    // restamps rather than erroring.
    store.finish_build("alpha", "run-1").await.unwrap();

    let builds = store.project_builds("alpha").await.unwrap();
    assert!(builds[0].finished.is_some());
}

#[tokio::test]
async fn duplicate_starts_create_independent_rows() {
    let (_dir, store, _) = scratch_store().await;

    let first = store.start_build("alpha", "run-1").await.unwrap();
    let second = store.start_build("alpha", "run-1").await.unwrap();
    assert_ne!(first, second);

    let builds = store.project_builds("alpha").await.unwrap();
    assert_eq!(builds.len(), 2);
}

#[tokio::test]
async fn list_projects_aggregates_latest_and_count() {
    let (_dir, store, url) = scratch_store().await;

    // Seed rows with controlled start times: three alpha builds (two
    // finished, one still running and most recent) plus one beta.
    let pool = SqlitePool::connect(&url).await.unwrap();
    for (name, build_id, started, finished) in [
        ("alpha", "run-1", 100_i64, Some(160_i64)),
        ("alpha", "run-2", 200, Some(260)),
        ("alpha", "run-3", 300, None),
        ("beta", "run-9", 150, Some(210)),
    ] {
        sqlx::query("INSERT INTO builds (name, build_id, started, finished) VALUES (?1, ?2, ?3, ?4)")
            .bind(name)
            .bind(build_id)
            .bind(started)
            .bind(finished)
            .execute(&pool)
            .await
            .unwrap();
    }

    let mut projects = store.list_projects().await.unwrap();
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(projects.len(), 2);

    let alpha = &projects[0];
    assert_eq!(alpha.name, "alpha");
    assert_eq!(alpha.build_count, 3);
    assert_eq!(alpha.latest_build.build_id, "run-3");
    assert_eq!(alpha.latest_build.started.timestamp(), 300);
    assert!(alpha.latest_build.is_running());

    let beta = &projects[1];
    assert_eq!(beta.build_count, 1);
    assert_eq!(beta.latest_build.duration, Some(60));
}

#[tokio::test]
async fn project_builds_ordered_most_recent_first() {
    let (_dir, store, url) = scratch_store().await;

    let pool = SqlitePool::connect(&url).await.unwrap();
    for (build_id, started) in [("old", 100_i64), ("new", 300), ("mid", 200)] {
        sqlx::query("INSERT INTO builds (name, build_id, started) VALUES ('alpha', ?1, ?2)")
            .bind(build_id)
            .bind(started)
            .execute(&pool)
            .await
            .unwrap();
    }

    let builds = store.project_builds("alpha").await.unwrap();
    let order: Vec<&str> = builds.iter().map(|b| b.build_id.as_str()).collect();
    assert_eq!(order, ["new", "mid", "old"]);
}

#[tokio::test]
async fn health_check_pings_the_database() {
    let (_dir, store, _) = scratch_store().await;
    store.health_check().await.unwrap();
}

#[tokio::test]
async fn empty_database_lists_no_projects() {
    let (_dir, store, _) = scratch_store().await;
    assert!(store.list_projects().await.unwrap().is_empty());
    assert!(store.project_builds("alpha").await.unwrap().is_empty());
}
