//! REST endpoints for the reporting dashboard.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::TimeDelta;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::clock::Clock;
use crate::error::DatabaseError;
use crate::store::ReactivationStore;

const DEFAULT_RECENT_LIMIT: usize = 50;
const DEFAULT_DAYS: i64 = 7;
const DEFAULT_TOP_LIMIT: usize = 10;
const MAX_LIMIT: usize = 500;

#[derive(Clone)]
pub struct DashboardState {
    pub store: Arc<dyn ReactivationStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

fn ok(data: Value) -> Response {
    Json(json!({"success": true, "data": data})).into_response()
}

fn failure(what: &str, e: DatabaseError) -> Response {
    tracing::error!(error = %e, "Dashboard query failed: {what}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "error": format!("Failed to load {what}")})),
    )
        .into_response()
}

fn limit_or(limit: Option<usize>, default: usize) -> usize {
    limit.filter(|l| *l > 0).unwrap_or(default).min(MAX_LIMIT)
}

/// GET /api/dashboard/stats
async fn stats(State(state): State<DashboardState>) -> Response {
    let stats = match state.store.dashboard_stats(state.clock.now()).await {
        Ok(s) => s,
        Err(e) => return failure("statistics", e),
    };
    ok(json!({
        "customers": stats.customers,
        "pets": stats.pets,
        "appointments": stats.upcoming_appointments,
        "messages": {
            "today": stats.messages_today,
            "week": stats.messages_week,
            "successRate": stats.success_rate(),
        },
        "messagesByType": stats.messages_by_category.iter()
            .map(|c| json!({"type": c.category, "count": c.count}))
            .collect::<Vec<_>>(),
        "upcoming": {
            "vaccines": stats.upcoming_vaccines,
            "appointments": stats.upcoming_appointments,
        },
        "petsBySpecies": stats.pets_by_species,
        "lastSync": stats.last_sync,
    }))
}

/// GET /api/dashboard/recent-messages?limit=N
async fn recent_messages(
    State(state): State<DashboardState>,
    Query(q): Query<LimitQuery>,
) -> Response {
    let limit = limit_or(q.limit, DEFAULT_RECENT_LIMIT);
    match state.store.recent_messages(limit).await {
        Ok(messages) => ok(messages
            .into_iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "type": m.category,
                    "customer": {"name": m.customer_name, "phone": m.customer_phone},
                    "pet": m.pet_name.map(|name| json!({"name": name})),
                    "sentAt": m.sent_at,
                    "status": m.status,
                    "error": m.error_message,
                })
            })
            .collect()),
        Err(e) => failure("recent messages", e),
    }
}

/// GET /api/dashboard/stats-by-day?days=N
async fn stats_by_day(
    State(state): State<DashboardState>,
    Query(q): Query<DaysQuery>,
) -> Response {
    let days = q.days.filter(|d| *d > 0).unwrap_or(DEFAULT_DAYS).min(366);
    let since = state.clock.today() - TimeDelta::days(days);
    match state.store.stats_by_day(since).await {
        Ok(rows) => ok(rows
            .into_iter()
            .map(|s| {
                let error_rate = if s.count > 0 {
                    ((s.count - s.success) as f64 / s.count as f64 * 1000.0).round() / 10.0
                } else {
                    0.0
                };
                json!({
                    "date": s.date,
                    "type": s.category,
                    "count": s.count,
                    "success": s.success,
                    "errorRate": error_rate,
                })
            })
            .collect()),
        Err(e) => failure("daily statistics", e),
    }
}

/// GET /api/dashboard/top-customers?limit=N
async fn top_customers(
    State(state): State<DashboardState>,
    Query(q): Query<LimitQuery>,
) -> Response {
    let limit = limit_or(q.limit, DEFAULT_TOP_LIMIT);
    match state.store.top_customers(limit).await {
        Ok(rows) => ok(rows
            .into_iter()
            .map(|c| {
                json!({
                    "customerId": c.customer_id,
                    "name": c.customer_name,
                    "phone": c.customer_phone,
                    "totalMessages": c.total_messages,
                    "lastMessage": c.last_message,
                })
            })
            .collect()),
        Err(e) => failure("top customers", e),
    }
}

pub fn dashboard_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/api/dashboard/stats", get(stats))
        .route("/api/dashboard/recent-messages", get(recent_messages))
        .route("/api/dashboard/stats-by-day", get(stats_by_day))
        .route("/api/dashboard/top-customers", get(top_customers))
        .with_state(state)
}
