//! Verify stage (spec.md §4.2 step 4): open a Voting Session, fetch each
//! configured verifier model's opinion in parallel (bounded concurrency),
//! submit every vote, and read the final Consensus Snapshot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shield_consensus::{ConsensusEngine, HaltConfig};
use shield_types::{ConsensusSnapshot, ModelId, Verdict, Vote};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::deps::{ModelGateway, ModelGatewayError, SimilarClaim};
use crate::models::ModelProfile;
use crate::retry::Retryable;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifyOutput {
    pub votes: Vec<Vote>,
    pub snapshot: ConsensusSnapshot,
}

#[derive(Debug, Error, Clone)]
pub enum VerifyError {
    #[error("consensus error: {0}")]
    Consensus(#[from] shield_consensus::ConsensusError),
}

impl Retryable for VerifyError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Bounded parallel fan-out across `models` (spec.md §5: "N model opinions
/// fetched in parallel, bounded by a per-instance concurrency cap").
/// A model call that errors or times out is recorded as a `Verdict::Error`
/// vote rather than aborting the stage — it's excluded from the valid-vote
/// set by the consensus algorithm but does not block the other models.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    consensus: &ConsensusEngine,
    gateway: &dyn ModelGateway,
    session_id: &str,
    halt_config: HaltConfig,
    models: &[ModelProfile],
    sanitized_text: &str,
    evidence: &[String],
    similar: &[SimilarClaim],
    concurrency: usize,
    model_call_timeout: std::time::Duration,
) -> Result<VerifyOutput, VerifyError> {
    consensus.open_session(session_id, halt_config);

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(models.len());
    for model in models {
        let sem = semaphore.clone();
        let model_id = model.id.to_string();
        let weight = model.default_weight;
        let text = sanitized_text.to_string();
        let ev = evidence.to_vec();
        let sim = similar.to_vec();
        handles.push(async move {
            let _permit = sem.acquire().await.expect("semaphore never closed");
            fetch_opinion(gateway, &model_id, weight, &text, &ev, &sim, model_call_timeout).await
        });
    }

    let votes: Vec<Vote> = futures::future::join_all(handles).await;

    for vote in &votes {
        consensus.submit_vote(session_id, vote.clone())?;
    }
    let snapshot = consensus.seal(session_id)?;

    Ok(VerifyOutput { votes, snapshot })
}

async fn fetch_opinion(
    gateway: &dyn ModelGateway,
    model_id: &str,
    weight: f64,
    sanitized_text: &str,
    evidence: &[String],
    similar: &[SimilarClaim],
    timeout: std::time::Duration,
) -> Vote {
    let call = gateway.opinion(model_id, weight, sanitized_text, evidence, similar);
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(vote)) => vote,
        Ok(Err(e)) => error_vote(model_id, weight, &e.to_string()),
        Err(_) => error_vote(model_id, weight, &ModelGatewayError::Timeout(model_id.to_string()).to_string()),
    }
}

fn error_vote(model_id: &str, weight: f64, reason: &str) -> Vote {
    Vote {
        model_id: ModelId(model_id.to_string()),
        verdict: Verdict::Error,
        confidence: 0.0,
        coherence: 0.0,
        reasoning: reason.to_string(),
        weight,
        timestamp: chrono::Utc::now(),
    }
}
