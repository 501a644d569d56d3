//! Service counters and their Prometheus text exposition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tally_core::StorageMode;

/// Process-wide request counters, shared by every handler.
pub struct ServiceMetrics {
    started_at: Instant,
    started_epoch: f64,
    pub requests_total: AtomicU64,
    pub builds_started: AtomicU64,
    pub builds_finished: AtomicU64,
    pub health_checks: AtomicU64,
    pub errors_total: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        let started_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            started_at: Instant::now(),
            started_epoch,
            requests_total: AtomicU64::new(0),
            builds_started: AtomicU64::new(0),
            builds_finished: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus text exposition format.
    pub fn render(&self, version: &str, mode: StorageMode) -> String {
        let uptime = self.started_at.elapsed().as_secs_f64();
        format!(
            "# HELP tally_info Information about the build tracking service\n\
             # TYPE tally_info gauge\n\
             tally_info{{version=\"{version}\",storage=\"{storage}\"}} 1\n\
             \n\
             # HELP tally_uptime_seconds Total uptime of the service in seconds\n\
             # TYPE tally_uptime_seconds gauge\n\
             tally_uptime_seconds {uptime:.2}\n\
             \n\
             # HELP tally_requests_total Total number of HTTP requests\n\
             # TYPE tally_requests_total counter\n\
             tally_requests_total {requests}\n\
             \n\
             # HELP tally_builds_started_total Total number of builds started\n\
             # TYPE tally_builds_started_total counter\n\
             tally_builds_started_total {started}\n\
             \n\
             # HELP tally_builds_finished_total Total number of builds finished\n\
             # TYPE tally_builds_finished_total counter\n\
             tally_builds_finished_total {finished}\n\
             \n\
             # HELP tally_health_checks_total Total number of health checks\n\
             # TYPE tally_health_checks_total counter\n\
             tally_health_checks_total {health}\n\
             \n\
             # HELP tally_errors_total Total number of errors\n\
             # TYPE tally_errors_total counter\n\
             tally_errors_total {errors}\n\
             \n\
             # HELP process_start_time_seconds Start time of the process since unix epoch in seconds\n\
             # TYPE process_start_time_seconds gauge\n\
             process_start_time_seconds {epoch:.2}\n",
            storage = mode.label(),
            requests = self.requests_total.load(Ordering::Relaxed),
            started = self.builds_started.load(Ordering::Relaxed),
            finished = self.builds_finished.load(Ordering::Relaxed),
            health = self.health_checks.load(Ordering::Relaxed),
            errors = self.errors_total.load(Ordering::Relaxed),
            epoch = self.started_epoch,
        )
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_contains_counters_and_labels() {
        let metrics = ServiceMetrics::new();
        ServiceMetrics::incr(&metrics.builds_started);
        ServiceMetrics::incr(&metrics.builds_started);
        ServiceMetrics::incr(&metrics.errors_total);

        let text = metrics.render("0.9.0", StorageMode::Namespace);
        assert!(text.contains("tally_info{version=\"0.9.0\",storage=\"namespace\"} 1"));
        assert!(text.contains("tally_builds_started_total 2"));
        assert!(text.contains("tally_errors_total 1"));
        assert!(text.contains("# TYPE tally_requests_total counter"));
    }
}
