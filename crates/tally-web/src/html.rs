//! HTML rendering for the dashboard and per-project history pages.
//!
//! Pure formatting over what the storage layer returns. Names and
//! build ids are charset-validated before they ever reach storage, so
//! they are safe to interpolate.

use chrono::{DateTime, Utc};
use tally_core::{Build, ProjectSummary, StorageMode};

const STYLE: &str = r#"
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; background-color: #0d1117; color: #c9d1d9; }
        .container { max-width: 1200px; margin: 20px auto; background-color: #161b22; padding: 24px; border-radius: 12px; border: 1px solid #30363d; }
        h1 { color: #f0f6fc; text-align: center; margin-bottom: 24px; }
        .info { background-color: #0d1117; padding: 16px; border-radius: 8px; margin-bottom: 24px; border: 1px solid #30363d; }
        .info strong { color: #58a6ff; }
        table { width: 100%; border-collapse: collapse; margin-top: 20px; }
        th, td { padding: 12px 16px; text-align: left; border-bottom: 1px solid #30363d; }
        th { background-color: #0d1117; font-weight: 600; color: #f0f6fc; }
        tr:hover { background-color: #1c2128; }
        .status-running { color: #f9826c; font-weight: 600; }
        .status-completed { color: #3fb950; font-weight: 600; }
        .footer { margin-top: 32px; text-align: center; color: #8b949e; font-size: 14px; }
        .links { margin-top: 24px; padding-top: 24px; border-top: 1px solid #30363d; }
        .links a { margin-right: 20px; color: #58a6ff; text-decoration: none; font-weight: 500; }
        .links a:hover { text-decoration: underline; }
"#;

/// Main page: one row per project with its latest build.
pub fn dashboard(projects: &[ProjectSummary], mode: StorageMode, version: &str) -> String {
    // Only relational mode has a history page worth linking to.
    let clickable = mode == StorageMode::Relational;

    let mut rows = String::new();
    for project in projects {
        let build = &project.latest_build;
        let onclick = if clickable {
            format!(
                " onclick=\"window.location.href='/project/{}'\" style=\"cursor: pointer;\"",
                project.name
            )
        } else {
            String::new()
        };
        rows.push_str(&format!(
            "<tr{onclick}>\
             <td>{name}</td><td>{build_id}</td>\
             <td><span class=\"{class}\">{status}</span></td>\
             <td>{started}</td><td>{duration}</td><td>{count}</td>\
             </tr>\n",
            name = project.name,
            build_id = build.build_id,
            class = status_class(build),
            status = status_text(build),
            started = format_time(&build.started),
            duration = format_duration(build),
            count = project.build_count,
        ));
    }

    let hint = if clickable {
        " | Click rows to view build history"
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Tally - Build Dashboard</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <h1>Build Dashboard</h1>
        <div class="info">
            <strong>Storage Mode:</strong> {mode}<br>
            <strong>Version:</strong> {version}<br>
            <strong>Projects:</strong> {count}
        </div>
        <table>
            <thead>
                <tr><th>Project</th><th>Latest Build ID</th><th>Status</th><th>Started</th><th>Duration</th><th>Total Builds</th></tr>
            </thead>
            <tbody>
{rows}            </tbody>
        </table>
        <div class="links">
            <strong>API Endpoints:</strong>
            <a href="/api/projects">JSON Projects</a>
            <a href="/metrics">Metrics</a>
            <a href="/health">Health</a>
        </div>
        <div class="footer">Tally v{version} | {mode} mode{hint}</div>
    </div>
</body>
</html>"#,
        mode = mode.label(),
        count = projects.len(),
    )
}

/// Per-project page: one row per build, most recent first.
pub fn build_history(name: &str, builds: &[Build], version: &str) -> String {
    let mut rows = String::new();
    for build in builds {
        rows.push_str(&format!(
            "<tr><td>{id}</td><td>{build_id}</td>\
             <td><span class=\"{class}\">{status}</span></td>\
             <td>{started}</td><td>{finished}</td><td>{duration}</td></tr>\n",
            id = build.id,
            build_id = build.build_id,
            class = status_class(build),
            status = status_text(build),
            started = format_time(&build.started),
            finished = build
                .finished
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| "N/A".to_string()),
            duration = format_duration(build),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Tally - {name}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <div class="links"><a href="/">&larr; Back to Dashboard</a></div>
        <h1>Build History: {name}</h1>
        <table>
            <thead>
                <tr><th>ID</th><th>Build ID</th><th>Status</th><th>Started</th><th>Finished</th><th>Duration</th></tr>
            </thead>
            <tbody>
{rows}            </tbody>
        </table>
        <div class="links">
            <strong>API Endpoints:</strong>
            <a href="/api/projects/{name}">JSON Builds</a>
            <a href="/api/projects">All Projects</a>
        </div>
        <div class="footer">Tally v{version} | {count} builds shown</div>
    </div>
</body>
</html>"#,
        count = builds.len(),
    )
}

fn status_text(build: &Build) -> &'static str {
    if build.is_running() {
        "Running"
    } else {
        "Completed"
    }
}

fn status_class(build: &Build) -> &'static str {
    if build.is_running() {
        "status-running"
    } else {
        "status-completed"
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(build: &Build) -> String {
    match build.duration {
        Some(secs) => format!("{secs}s"),
        None => "N/A".to_string(),
    }
}
