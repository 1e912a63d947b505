//! API-key / reviewer-key / model-key authentication (spec.md §6's Auth
//! column), a `tower` middleware layer mirroring
//! `knhk-workflow-engine::api::middleware::auth_middleware`'s
//! header-then-`next.run` shape, generalized to three distinct key kinds
//! checked against `shield-metering`'s account table.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller's account id, inserted as a request extension
/// by each key-kind middleware so handlers can read it back (e.g. for
/// quota recording on claim submission).
#[derive(Clone, Debug)]
pub struct AccountId(pub String);

fn extract_key<'a>(headers: &'a HeaderMap, header_name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthenticated(format!("missing {header_name} header")))
}

async fn authenticate(state: &AppState, headers: &HeaderMap, header_name: &str) -> Result<AccountId, ApiError> {
    let key = extract_key(headers, header_name)?;
    state.accounts.tier_of(key)?;
    Ok(AccountId(key.to_string()))
}

pub async fn require_api_key(State(state): State<AppState>, headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let account = authenticate(&state, &headers, "x-api-key").await?;
    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}

pub async fn require_reviewer_key(State(state): State<AppState>, headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let account = authenticate(&state, &headers, "x-reviewer-key").await?;
    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}

pub async fn require_model_key(State(state): State<AppState>, headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let account = authenticate(&state, &headers, "x-model-key").await?;
    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}
