//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::tournament::TournamentError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::{FixtureView, StandingView};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/tournaments/:id/standings", get(standings_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
    active_rooms: usize,
    active_tournaments: usize,
    single_queue_size: usize,
    tournament_queue_size: usize,
    connected_users: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (single_queue_size, tournament_queue_size) = state.rooms.queue_sizes().await;

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.registry.active_matches(),
        active_players: state.registry.total_players(),
        active_rooms: state.rooms.active_rooms(),
        active_tournaments: state.tournaments.active_tournaments(),
        single_queue_size,
        tournament_queue_size,
        connected_users: state.fanout.connected_count(),
    })
}

// ============================================================================
// Tournament endpoints
// ============================================================================

#[derive(Serialize)]
struct StandingsResponse {
    tournament_id: Uuid,
    fixtures: Vec<FixtureView>,
    standings: Vec<StandingView>,
}

async fn standings_handler(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthenticatedUser>,
    Path(tournament_id): Path<Uuid>,
) -> Result<Json<StandingsResponse>, AppError> {
    let (fixtures, standings) = state
        .tournaments
        .standings(tournament_id)
        .await
        .map_err(|e| match e {
            TournamentError::NotFound => AppError::NotFound("Tournament not found".to_string()),
            other => AppError::Internal(other.to_string()),
        })?;

    Ok(Json(StandingsResponse {
        tournament_id,
        fixtures,
        standings,
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
