//! Operator HTTP API.
//!
//! Authorization is granted out-of-band: an operator looks up the users who
//! wrote to the bot and flips their flag here. Every `/api` route requires
//! `Authorization: Bearer <ADMIN_TOKEN>`.
//!
//! Endpoints:
//! - GET  /health: liveness
//! - GET  /api/recipients: every registered user
//! - POST /api/recipients/{id}/authorize: allow a user to broadcast
//! - POST /api/recipients/{id}/revoke: take the permission away
//! - GET  /api/drafts: number of drafts awaiting a decision

use std::sync::Arc;

use announce_core::{PendingRegistry, Recipient, RecipientId, UserDirectory};
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state of the operator API.
pub struct ApiState {
    pub directory: Arc<dyn UserDirectory>,
    pub registry: Arc<PendingRegistry>,
    pub token: String,
}

/// Response for the authorize/revoke routes.
#[derive(Debug, Serialize)]
pub struct AuthorizationResponse {
    pub id: RecipientId,
    pub authorized: bool,
}

/// Response for GET /api/drafts.
#[derive(Debug, Serialize)]
pub struct DraftsResponse {
    pub pending: usize,
}

pub fn router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .route("/api/recipients", get(list_recipients))
        .route("/api/recipients/{id}/authorize", post(authorize))
        .route("/api/recipients/{id}/revoke", post(revoke))
        .route("/api/drafts", get(pending_drafts))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn require_token(State(state): State<Arc<ApiState>>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(state.token.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(req).await
}

/// GET /api/recipients: every registered user.
async fn list_recipients(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<Recipient>>, StatusCode> {
    state.directory.list_recipients().await.map(Json).map_err(|e| {
        error!("Listing recipients failed: {e}");
        StatusCode::SERVICE_UNAVAILABLE
    })
}

/// POST /api/recipients/{id}/authorize
async fn authorize(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<RecipientId>,
) -> Result<Json<AuthorizationResponse>, StatusCode> {
    set_authorized(&state, id, true).await
}

/// POST /api/recipients/{id}/revoke
async fn revoke(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<RecipientId>,
) -> Result<Json<AuthorizationResponse>, StatusCode> {
    set_authorized(&state, id, false).await
}

async fn set_authorized(
    state: &ApiState,
    id: RecipientId,
    authorized: bool,
) -> Result<Json<AuthorizationResponse>, StatusCode> {
    match state.directory.set_authorized(id, authorized).await {
        Ok(0) => Err(StatusCode::NOT_FOUND),
        Ok(_) => {
            info!("Operator set authorization of {id} to {authorized}");
            Ok(Json(AuthorizationResponse { id, authorized }))
        }
        Err(e) => {
            error!("Updating authorization of {id} failed: {e}");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// GET /api/drafts: drafts awaiting a decision.
async fn pending_drafts(State(state): State<Arc<ApiState>>) -> Json<DraftsResponse> {
    Json(DraftsResponse { pending: state.registry.len() })
}
