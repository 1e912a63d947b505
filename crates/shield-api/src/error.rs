//! Unified API error type and its HTTP translation (spec.md §6's error
//! code table), grounded on `knhk-workflow-engine::api::models::errors`'
//! `ApiError`/`to_http_status` shape.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use shield_consensus::ConsensusError;
use shield_evidence::StoreError;
use shield_hitl::HitlError;
use shield_ledger::LedgerError;
use shield_metering::MeteringError;
use shield_pipeline::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip)]
    pub price_usd: Option<f64>,
    #[serde(skip)]
    pub currency: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            price_usd: None,
            currency: None,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new("UNAUTHENTICATED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    fn to_http_status(&self) -> StatusCode {
        match self.code.as_str() {
            "INVALID_INPUT" => StatusCode::BAD_REQUEST,
            "UNAUTHENTICATED" => StatusCode::UNAUTHORIZED,
            "QUOTA_EXCEEDED" | "PRIORITY_NOT_ALLOWED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "ALREADY_RESOLVED" | "SESSION_SEALED" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "PAYMENT_REQUIRED" => StatusCode::PAYMENT_REQUIRED,
            "DEPENDENCY_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        let mut headers = HeaderMap::new();
        if let (Some(price), Some(currency)) = (self.price_usd, &self.currency) {
            if let Ok(v) = HeaderValue::from_str(&format!("{price:.2}")) {
                headers.insert("X-Price", v);
            }
            if let Ok(v) = HeaderValue::from_str(currency) {
                headers.insert("X-Currency", v);
            }
        }
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message, "details": self.details }
        });
        (status, headers, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ConsensusError> for ApiError {
    fn from(err: ConsensusError) -> Self {
        match err {
            ConsensusError::InvalidInput(msg) => ApiError::new("INVALID_INPUT", msg),
            ConsensusError::SessionSealed(id) => ApiError::new("SESSION_SEALED", format!("session {id} is sealed")),
            ConsensusError::NotFound(id) => ApiError::not_found(format!("session {id} not found")),
        }
    }
}

impl From<HitlError> for ApiError {
    fn from(err: HitlError) -> Self {
        match err {
            HitlError::NotFound(id) => ApiError::not_found(format!("ticket {id} not found")),
            HitlError::AlreadyResolved(id) => ApiError::new("ALREADY_RESOLVED", format!("ticket {id} is already resolved")),
            HitlError::Storage(msg) => ApiError::new("INTERNAL_ERROR", msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::not_found(format!("proof {id} not found")),
            other => ApiError::new("INTERNAL_ERROR", other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::new("INTERNAL_ERROR", err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::new("INTERNAL_ERROR", err.to_string())
    }
}

impl From<MeteringError> for ApiError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::UnknownAccount(id) => ApiError::unauthenticated(format!("unknown account {id}")),
            MeteringError::QuotaExceeded { account_id, limit_per_day } => {
                ApiError::new("QUOTA_EXCEEDED", format!("account {account_id} exceeded its daily limit of {limit_per_day} requests"))
            }
            MeteringError::PaymentRequired { account_id, price_usd, currency } => {
                let mut e = ApiError::new("PAYMENT_REQUIRED", format!("account {account_id} requires payment to continue"));
                e.price_usd = Some(price_usd);
                e.currency = Some(currency);
                e
            }
            MeteringError::PriorityNotAllowed { account_id, tier, requested } => ApiError::new(
                "PRIORITY_NOT_ALLOWED",
                format!("account {account_id} (tier {tier:?}) may not submit priority={requested:?} claims"),
            ),
        }
    }
}
