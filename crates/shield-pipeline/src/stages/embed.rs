//! Embed stage (spec.md §4.2 step 2): fixed-dimension vectors for the
//! redacted body and concatenated evidence, persisted into the Vector
//! Index, plus their cosine similarity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deps::{cosine_similarity, embed_text, VectorIndex, VectorIndexError, VectorKind};
use crate::retry::Retryable;

pub const EMBEDDING_DIMS: usize = 768;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbedOutput {
    pub body_vector: Vec<f32>,
    pub evidence_vector: Vec<f32>,
    pub claim_evidence_similarity: f32,
}

#[derive(Debug, Error, Clone)]
pub enum EmbedError {
    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),
}

impl Retryable for EmbedError {
    fn is_retryable(&self) -> bool {
        true
    }
}

pub async fn run(index: &dyn VectorIndex, claim_id: &str, redacted_text: &str, redacted_evidence: &[String]) -> Result<EmbedOutput, EmbedError> {
    let body_vector = embed_text(redacted_text, EMBEDDING_DIMS);
    let evidence_blob = redacted_evidence.join("\n");
    let evidence_vector = embed_text(&evidence_blob, EMBEDDING_DIMS);

    index.upsert(claim_id, VectorKind::Body, body_vector.clone()).await?;
    index.upsert(claim_id, VectorKind::Evidence, evidence_vector.clone()).await?;

    let claim_evidence_similarity = cosine_similarity(&body_vector, &evidence_vector);

    Ok(EmbedOutput {
        body_vector,
        evidence_vector,
        claim_evidence_similarity,
    })
}
