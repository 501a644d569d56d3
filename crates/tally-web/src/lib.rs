//! HTTP surface for the build tracker.
//!
//! Thin layer over the storage contract: request parsing and
//! validation, JSON/HTML serialization, service counters. No domain
//! logic lives here.

pub mod api;
pub mod html;
pub mod metrics;

pub use api::{router, AppState};
pub use metrics::ServiceMetrics;
