//! Read-only reporting over the reactivation log.

pub mod routes;

pub use routes::{DashboardState, dashboard_routes};
