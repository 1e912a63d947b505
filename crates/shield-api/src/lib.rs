//! Ingress API: claim submission, status/proof/audit readback, HITL
//! decisions, and the consensus vote surface (spec.md §6). The router is
//! grounded on `knhk-workflow-engine::api::rest::server::RestApiServer`'s
//! `Router::new().route(...).with_state(...)` shape, with per-route
//! auth middleware layered the way `api::middleware` layers
//! `auth_middleware` over selected routes.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let claim_write = Router::new()
        .route("/v1/claims", post(routes::submit_claim))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    let claim_read = Router::new()
        .route("/v1/claims/:id", get(routes::get_claim))
        .route("/v1/claims/:id/proof", get(routes::get_proof))
        .route("/v1/claims/:id/audit", get(routes::get_audit))
        .route("/v1/consensus/:session", get(routes::get_consensus))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    let hitl = Router::new()
        .route("/v1/claims/:id/approve", post(routes::approve_claim))
        .route("/v1/claims/:id/reject", post(routes::reject_claim))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_reviewer_key));

    let consensus_write = Router::new()
        .route("/v1/consensus/:session/vote", post(routes::submit_vote))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_model_key));

    let health = Router::new().route("/health", get(routes::health));

    Router::new()
        .merge(claim_write)
        .merge(claim_read)
        .merge(hitl)
        .merge(consensus_write)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
