// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Exposes exactly the §6 read APIs plus the CEX-listing webhook bridge. No
// bearer-token gate: authentication middleware is an explicit Non-goal
// external collaborator (spec §1), so every route here is public.
//
// CORS is configured permissively, matching the teacher's development
// posture — tighten `allowed_origins` at the deployment's edge, not here.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::orchestrator::Orchestrator;
use crate::types::{CexListingEvent, LeaderboardCategory};

// =============================================================================
// Router construction
// =============================================================================

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/hotlist", get(hotlist))
        .route("/api/v1/leaderboards", get(leaderboards))
        .route("/api/v1/leaderboards/:category", get(leaderboard_category))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/health", get(health))
        .route("/api/v1/webhooks/cex-listing", post(cex_listing_webhook))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(orchestrator)
}

// =============================================================================
// GET /api/v1/hotlist
// =============================================================================

async fn hotlist(State(orch): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orch.hotlist())
}

// =============================================================================
// GET /api/v1/leaderboards
// =============================================================================

async fn leaderboards(State(orch): State<Arc<Orchestrator>>) -> impl IntoResponse {
    let mut map = serde_json::Map::new();
    for category in LeaderboardCategory::ALL {
        map.insert(
            category.as_str().to_string(),
            serde_json::to_value(orch.leaderboard(category)).unwrap_or_default(),
        );
    }
    Json(serde_json::Value::Object(map))
}

// =============================================================================
// GET /api/v1/leaderboards/:category
// =============================================================================

async fn leaderboard_category(
    State(orch): State<Arc<Orchestrator>>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    match LeaderboardCategory::parse(&category) {
        Some(cat) => Json(orch.leaderboard(cat)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("unknown leaderboard category: '{category}'"),
            })),
        )
            .into_response(),
    }
}

// =============================================================================
// GET /api/v1/config
// =============================================================================

async fn get_config(State(orch): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orch.config_snapshot())
}

// =============================================================================
// GET /api/v1/health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    report: crate::orchestrator::HealthReport,
    server_time: i64,
}

async fn health(State(orch): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(HealthResponse {
        report: orch.health_report(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// POST /api/v1/webhooks/cex-listing
// =============================================================================
//
// Bridge for an out-of-process Sentinel deployment (spec §6): accepts a
// CEXListingEvent and feeds it through the same `handle_listing_event` path
// the in-process Sentinel uses.

async fn cex_listing_webhook(
    State(orch): State<Arc<Orchestrator>>,
    Json(event): Json<CexListingEvent>,
) -> impl IntoResponse {
    info!(exchange = %event.exchange, symbol = %event.token.symbol, "cex listing webhook received");
    orch.handle_listing_event(event).await;
    StatusCode::ACCEPTED
}
