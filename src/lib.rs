//! Vet Reactivation: WhatsApp reactivation bot for veterinary clinics.

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod reactivation;
pub mod store;
pub mod vetcare;

use std::sync::Arc;

use axum::Router;

use crate::clock::Clock;
use crate::dashboard::{DashboardState, dashboard_routes};
use crate::jobs::JobRegistry;
use crate::jobs::routes::{JobRouteState, job_routes};
use crate::store::ReactivationStore;

/// The full HTTP surface: health, status, manual triggers and dashboard.
pub fn http_router(
    registry: Arc<JobRegistry>,
    store: Arc<dyn ReactivationStore>,
    clock: Arc<dyn Clock>,
) -> Router {
    job_routes(JobRouteState { registry }).merge(dashboard_routes(DashboardState { store, clock }))
}
