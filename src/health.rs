//! `GET /api/health` — returns 200 once startup has completed and the
//! number of unhealthy disks is below the configured threshold, else 500.
//!
//! Grounded in `health_action.h`'s trivial `HealthAction::handle`; the
//! teacher's `health_handlers.rs` full liveness/readiness/startup probe
//! suite is out of scope here, this boundary names exactly one endpoint.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub struct HealthState {
    startup_succeeded: AtomicBool,
    unhealthy_disks: AtomicUsize,
    unhealthy_disk_threshold: usize,
}

impl HealthState {
    pub fn new(unhealthy_disk_threshold: usize) -> Self {
        Self {
            startup_succeeded: AtomicBool::new(false),
            unhealthy_disks: AtomicUsize::new(0),
            unhealthy_disk_threshold,
        }
    }

    pub fn mark_startup_succeeded(&self) {
        self.startup_succeeded.store(true, Ordering::SeqCst);
    }

    pub fn set_unhealthy_disks(&self, count: usize) {
        self.unhealthy_disks.store(count, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.startup_succeeded.load(Ordering::SeqCst)
            && self.unhealthy_disks.load(Ordering::SeqCst) < self.unhealthy_disk_threshold
    }
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new().route("/api/health", get(move || health_handler(state.clone())))
}

async fn health_handler(state: Arc<HealthState>) -> (StatusCode, &'static str) {
    if state.is_healthy() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "UNHEALTHY")
    }
}
