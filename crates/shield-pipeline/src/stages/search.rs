//! Search stage (spec.md §4.2 step 3): top-K nearest prior claim vectors,
//! filtered to cosine score > 0.7, excluding the claim just inserted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deps::{SimilarClaim, VectorIndex, VectorIndexError};
use crate::retry::Retryable;

pub const DEFAULT_TOP_K: usize = 5;
pub const SIMILARITY_FLOOR: f32 = 0.7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    pub similar_claims: Vec<SimilarClaim>,
}

#[derive(Debug, Error, Clone)]
pub enum SearchError {
    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),
}

impl Retryable for SearchError {
    fn is_retryable(&self) -> bool {
        true
    }
}

pub async fn run(index: &dyn VectorIndex, claim_id: &str, body_vector: &[f32]) -> Result<SearchOutput, SearchError> {
    let candidates = index.top_k(body_vector, DEFAULT_TOP_K, claim_id).await?;
    let similar_claims = candidates.into_iter().filter(|c| c.score > SIMILARITY_FLOOR).collect();
    Ok(SearchOutput { similar_claims })
}
