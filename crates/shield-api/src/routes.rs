//! Route handlers for spec.md §6's route table plus the audit-trail
//! readback supplement, grounded on
//! `knhk-workflow-engine::api::rest::handlers`'s
//! `State<Arc<T>> + Path/Json extractors -> Response` shape.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use shield_metering::HealthStatus;
use shield_types::{Claim, Decision, Domain, Priority, Vote};

use crate::auth::AccountId;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubmitClaimRequest {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub domain: Option<Domain>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Serialize)]
pub struct SubmitClaimResponse {
    pub instance_accepted: bool,
    pub claim_id: String,
}

/// `POST /v1/claims`. The pipeline may suspend on HITL for up to its
/// configured deadline, so submission returns immediately with a
/// 202-equivalent acceptance and the instance is driven to completion on
/// a detached task; callers poll `GET /v1/claims/{id}`.
pub async fn submit_claim(
    State(state): State<AppState>,
    Extension(account): Extension<AccountId>,
    Json(req): Json<SubmitClaimRequest>,
) -> ApiResult<Response> {
    if req.id.is_empty() || req.text.is_empty() {
        return Err(ApiError::new("INVALID_INPUT", "claim id and text are required"));
    }
    state.accounts.check_and_record(&account.0, req.priority)?;

    let claim = Claim::new(req.id.clone(), req.text).with_evidence(req.evidence).with_priority(req.priority);
    let claim = match req.domain {
        Some(domain) => claim.with_domain(domain),
        None => claim,
    };

    let orchestrator = state.orchestrator.clone();
    let claim_id = claim.id.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(claim).await {
            tracing::warn!(claim_id = %claim_id, error = %e, "pipeline instance failed");
        }
    });

    let body = SubmitClaimResponse { instance_accepted: true, claim_id: req.id };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// `GET /v1/claims/{id}`.
pub async fn get_claim(State(state): State<AppState>, Path(claim_id): Path<String>) -> ApiResult<Response> {
    let instance = state
        .orchestrator
        .instance(&claim_id)
        .ok_or_else(|| ApiError::not_found(format!("claim {claim_id} has no tracked instance")))?;
    Ok(Json(instance).into_response())
}

#[derive(Deserialize, Default)]
pub struct HitlDecisionRequest {
    #[serde(default)]
    pub reason: String,
}

async fn resolve_hitl(state: &AppState, account: &AccountId, claim_id: &str, decision: Decision, reason: String) -> ApiResult<Response> {
    let instance = state
        .orchestrator
        .instance(claim_id)
        .ok_or_else(|| ApiError::not_found(format!("claim {claim_id} has no tracked instance")))?;
    let ticket_id = match instance.status {
        shield_types::PipelineStatus::AwaitingHitl { ticket_id } => ticket_id,
        _ => return Err(ApiError::new("INVALID_INPUT", format!("claim {claim_id} is not awaiting hitl review"))),
    };
    let ticket = state.orchestrator.hitl().resolve(&ticket_id, decision, account.0.clone(), reason)?;
    Ok(Json(ticket).into_response())
}

/// `POST /v1/claims/{id}/approve`.
pub async fn approve_claim(
    State(state): State<AppState>,
    Extension(account): Extension<AccountId>,
    Path(claim_id): Path<String>,
    Json(req): Json<HitlDecisionRequest>,
) -> ApiResult<Response> {
    resolve_hitl(&state, &account, &claim_id, Decision::Approved, req.reason).await
}

/// `POST /v1/claims/{id}/reject`.
pub async fn reject_claim(
    State(state): State<AppState>,
    Extension(account): Extension<AccountId>,
    Path(claim_id): Path<String>,
    Json(req): Json<HitlDecisionRequest>,
) -> ApiResult<Response> {
    resolve_hitl(&state, &account, &claim_id, Decision::Rejected, req.reason).await
}

/// `GET /v1/claims/{id}/proof`. Served from the orchestrator's cache
/// (best-effort, TTL-bounded), not a direct Evidence Store read.
pub async fn get_proof(State(state): State<AppState>, Path(claim_id): Path<String>) -> ApiResult<Response> {
    let cached = state
        .orchestrator
        .cache()
        .get(&format!("proof:{claim_id}"))
        .ok_or_else(|| ApiError::not_found(format!("no cached proof for claim {claim_id}")))?;
    Ok(Json(cached).into_response())
}

/// `GET /v1/claims/{id}/audit` **[SUPPLEMENT]**.
pub async fn get_audit(State(state): State<AppState>, Path(claim_id): Path<String>) -> ApiResult<Response> {
    let events = state.orchestrator.ledger().for_claim(&claim_id)?;
    Ok(Json(events).into_response())
}

/// `POST /v1/consensus/{session}/vote`.
pub async fn submit_vote(State(state): State<AppState>, Path(session_id): Path<String>, Json(vote): Json<Vote>) -> ApiResult<Response> {
    let snapshot = state.orchestrator.consensus().submit_vote(&session_id, vote)?;
    Ok(Json(snapshot).into_response())
}

/// `GET /v1/consensus/{session}`.
pub async fn get_consensus(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult<Response> {
    let snapshot = state.orchestrator.consensus().get_snapshot(&session_id)?;
    Ok(Json(snapshot).into_response())
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Response {
    let overall = state.fleet.overall();
    let status_code = match overall {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = serde_json::json!({
        "status": overall,
        "components": state.fleet.snapshot(),
    });
    (status_code, Json(body)).into_response()
}
