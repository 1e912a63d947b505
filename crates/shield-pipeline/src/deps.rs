//! Dependency interfaces the pipeline stages are parameterized over
//! (spec.md §9 design note: "stage inputs/outputs are pure functions of
//! `(PipelineInstance, dependency trait objects)`"). `VectorIndex` and
//! `ModelGateway` have no concrete crate of their own in this workspace —
//! unlike `EvidenceStore`/`AuditLedger`/`Cache`, which are already
//! sled/dashmap-backed concrete types reused directly — so they're defined
//! here as traits with an in-memory test double, mirroring
//! `knhk-workflow-engine`'s dependency-injected stage functions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum VectorIndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone)]
pub enum ModelGatewayError {
    #[error("model {0} timed out")]
    Timeout(String),
    #[error("model {0} returned a malformed opinion: {1}")]
    Malformed(String, String),
    #[error("model {0} is unavailable: {1}")]
    Unavailable(String, String),
}

/// One vector kind per embedded artifact, so a claim's body and evidence
/// vectors never collide under the same key (spec.md §4.2 Embed: "persist
/// both into the Vector Index keyed by claim id").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorKind {
    Body,
    Evidence,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarClaim {
    pub claim_id: String,
    pub score: f32,
}

/// Stores and queries fixed-dimension embedding vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, claim_id: &str, kind: VectorKind, vector: Vec<f32>) -> Result<(), VectorIndexError>;

    /// Top-`k` nearest body vectors to `query`, excluding `exclude_claim_id`,
    /// sorted by descending cosine score.
    async fn top_k(&self, query: &[f32], k: usize, exclude_claim_id: &str) -> Result<Vec<SimilarClaim>, VectorIndexError>;
}

/// Requests a structured opinion from one verifier model.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn opinion(
        &self,
        model_id: &str,
        weight: f64,
        sanitized_text: &str,
        evidence: &[String],
        similar: &[SimilarClaim],
    ) -> Result<shield_types::Vote, ModelGatewayError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Deterministic pseudo-embedding: a hash-seeded 768-dim unit vector. There
/// is no real embedding model wired into this workspace (spec.md's
/// Non-goals exclude model training/hosting); this stands in for the
/// vector producer that would normally call out to one.
pub fn embed_text(text: &str, dims: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut out = Vec::with_capacity(dims);
    let mut seed = {
        let mut h = DefaultHasher::new();
        text.hash(&mut h);
        h.finish()
    };
    for _ in 0..dims {
        // xorshift64
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let v = (seed % 2000) as f32 / 1000.0 - 1.0;
        out.push(v);
    }
    out
}

/// Default production `ModelGateway`: there is no external model host wired
/// into this workspace (spec.md's Non-goals exclude model training/hosting),
/// so each "opinion" is synthesized from the claim text's agreement with its
/// own evidence and nearest neighbors, using the same `embed_text`/
/// `cosine_similarity` the Embed/Search stages already produce. Distinct
/// models vary only by a per-model seed salt, so a quorum doesn't trivially
/// unanimous-vote on every claim.
#[derive(Clone, Debug, Default)]
pub struct HeuristicModelGateway;

#[async_trait]
impl ModelGateway for HeuristicModelGateway {
    async fn opinion(
        &self,
        model_id: &str,
        weight: f64,
        sanitized_text: &str,
        evidence: &[String],
        similar: &[SimilarClaim],
    ) -> Result<shield_types::Vote, ModelGatewayError> {
        let salted = format!("{model_id}:{sanitized_text}");
        let claim_vec = embed_text(&salted, 64);

        let evidence_score = if evidence.is_empty() {
            0.5
        } else {
            let evidence_vecs: Vec<f32> = evidence
                .iter()
                .flat_map(|e| embed_text(&format!("{model_id}:{e}"), 64))
                .collect();
            let chunks: Vec<&[f32]> = evidence_vecs.chunks(64).collect();
            let scores: Vec<f32> = chunks.iter().map(|v| cosine_similarity(&claim_vec, v)).collect();
            let avg = scores.iter().sum::<f32>() / scores.len() as f32;
            ((avg + 1.0) / 2.0) as f64
        };

        let similar_penalty = similar.iter().map(|s| s.score).fold(0.0_f32, f32::max) as f64 * 0.1;
        let confidence = (evidence_score - similar_penalty).clamp(0.0, 1.0);
        let coherence = evidence_score.clamp(0.0, 1.0);

        let verdict = if confidence >= 0.6 {
            shield_types::Verdict::Verified
        } else if confidence <= 0.35 {
            shield_types::Verdict::Unverified
        } else {
            shield_types::Verdict::NeedsReview
        };

        Ok(shield_types::Vote {
            model_id: shield_types::ModelId(model_id.to_string()),
            verdict,
            confidence,
            coherence,
            reasoning: format!("heuristic agreement score {evidence_score:.2} against {} evidence item(s)", evidence.len()),
            weight,
            timestamp: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod heuristic_tests {
    use super::*;

    #[tokio::test]
    async fn well_evidenced_claim_is_verified() {
        let gw = HeuristicModelGateway;
        let vote = gw
            .opinion("m1", 1.0, "the sky is blue", &["the sky is blue".to_string()], &[])
            .await
            .unwrap();
        assert_eq!(vote.verdict, shield_types::Verdict::Verified);
    }

    #[tokio::test]
    async fn same_inputs_are_deterministic() {
        let gw = HeuristicModelGateway;
        let a = gw.opinion("m2", 1.0, "claim text", &["some evidence".to_string()], &[]).await.unwrap();
        let b = gw.opinion("m2", 1.0, "claim text", &["some evidence".to_string()], &[]).await.unwrap();
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.verdict, b.verdict);
    }
}

/// sled-backed `VectorIndex`: every claim's body/evidence vector is a
/// durable row, scanned in full for `top_k` (spec.md §4.2 Embed/Search
/// don't specify an index structure beyond "persist ... keyed by claim
/// id" and "nearest neighbors"; a linear scan over bincode-encoded f32
/// vectors is the simplest thing that satisfies both at this workspace's
/// scale, the same tradeoff `EvidenceStore::scan_by_date` makes).
pub struct SledVectorIndex {
    db: sled::Db,
}

fn vector_key(kind: VectorKind, claim_id: &str) -> Vec<u8> {
    let prefix = match kind {
        VectorKind::Body => "vec/body",
        VectorKind::Evidence => "vec/evidence",
    };
    format!("{prefix}/{claim_id}").into_bytes()
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

impl SledVectorIndex {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, sled::Error> {
        Ok(Self { db: sled::open(path)? })
    }

    pub fn open_temporary() -> Result<Self, sled::Error> {
        Ok(Self { db: sled::Config::new().temporary(true).open()? })
    }
}

#[async_trait]
impl VectorIndex for SledVectorIndex {
    async fn upsert(&self, claim_id: &str, kind: VectorKind, vector: Vec<f32>) -> Result<(), VectorIndexError> {
        self.db
            .insert(vector_key(kind, claim_id), encode_vector(&vector))
            .map_err(|e| VectorIndexError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn top_k(&self, query: &[f32], k: usize, exclude_claim_id: &str) -> Result<Vec<SimilarClaim>, VectorIndexError> {
        let prefix = b"vec/body/";
        let mut scored = Vec::new();
        for kv in self.db.scan_prefix(prefix) {
            let (key, value) = kv.map_err(|e| VectorIndexError::Unavailable(e.to_string()))?;
            let claim_id = String::from_utf8_lossy(&key[prefix.len()..]).to_string();
            if claim_id == exclude_claim_id {
                continue;
            }
            let vector = decode_vector(&value);
            scored.push(SimilarClaim {
                claim_id,
                score: cosine_similarity(query, &vector),
            });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod sled_vector_index_tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_top_k_finds_the_nearest_neighbor() {
        let index = SledVectorIndex::open_temporary().unwrap();
        index.upsert("c1", VectorKind::Body, vec![1.0, 0.0, 0.0]).await.unwrap();
        index.upsert("c2", VectorKind::Body, vec![0.0, 1.0, 0.0]).await.unwrap();
        let out = index.top_k(&[1.0, 0.0, 0.0], 1, "").await.unwrap();
        assert_eq!(out[0].claim_id, "c1");
    }

    #[tokio::test]
    async fn top_k_excludes_the_query_claim() {
        let index = SledVectorIndex::open_temporary().unwrap();
        index.upsert("c1", VectorKind::Body, vec![1.0, 0.0]).await.unwrap();
        index.upsert("c2", VectorKind::Body, vec![0.9, 0.1]).await.unwrap();
        let out = index.top_k(&[1.0, 0.0], 5, "c1").await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].claim_id, "c2");
    }

    #[tokio::test]
    async fn evidence_vectors_do_not_leak_into_top_k() {
        let index = SledVectorIndex::open_temporary().unwrap();
        index.upsert("c1", VectorKind::Evidence, vec![1.0, 0.0]).await.unwrap();
        let out = index.top_k(&[1.0, 0.0], 5, "").await.unwrap();
        assert!(out.is_empty());
    }
}

/// In-memory test doubles for `VectorIndex`/`ModelGateway`, exported (not
/// `cfg(test)`-gated) so both this crate's unit tests and `tests/`
/// integration tests can script exact scenarios.
pub mod test_doubles {
    use super::*;
    use parking_lot::RwLock;
    use shield_types::{ModelId, Vote};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    pub struct InMemoryVectorIndex {
        body: Arc<RwLock<HashMap<String, Vec<f32>>>>,
        evidence: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    }

    #[async_trait]
    impl VectorIndex for InMemoryVectorIndex {
        async fn upsert(&self, claim_id: &str, kind: VectorKind, vector: Vec<f32>) -> Result<(), VectorIndexError> {
            let mut map = match kind {
                VectorKind::Body => self.body.write(),
                VectorKind::Evidence => self.evidence.write(),
            };
            map.insert(claim_id.to_string(), vector);
            Ok(())
        }

        async fn top_k(&self, query: &[f32], k: usize, exclude_claim_id: &str) -> Result<Vec<SimilarClaim>, VectorIndexError> {
            let map = self.body.read();
            let mut scored: Vec<SimilarClaim> = map
                .iter()
                .filter(|(id, _)| id.as_str() != exclude_claim_id)
                .map(|(id, v)| SimilarClaim {
                    claim_id: id.clone(),
                    score: cosine_similarity(query, v),
                })
                .collect();
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(k);
            Ok(scored)
        }
    }

    /// Returns one canned vote per model, keyed by model id, so tests can
    /// script exact scenarios (spec.md §8 Scenarios A-C).
    #[derive(Default, Clone)]
    pub struct ScriptedModelGateway {
        pub scripted: Arc<RwLock<HashMap<String, Vote>>>,
    }

    impl ScriptedModelGateway {
        pub fn with(votes: Vec<Vote>) -> Self {
            let map = votes.into_iter().map(|v| (v.model_id.0.clone(), v)).collect();
            Self {
                scripted: Arc::new(RwLock::new(map)),
            }
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedModelGateway {
        async fn opinion(
            &self,
            model_id: &str,
            weight: f64,
            _sanitized_text: &str,
            _evidence: &[String],
            _similar: &[SimilarClaim],
        ) -> Result<Vote, ModelGatewayError> {
            self.scripted
                .read()
                .get(model_id)
                .cloned()
                .map(|mut v| {
                    v.weight = weight;
                    v
                })
                .ok_or_else(|| ModelGatewayError::Unavailable(model_id.to_string(), "no script entry".into()))
                .map(|v| Vote { model_id: ModelId(model_id.to_string()), ..v })
        }
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = embed_text("hello world", 16);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn embed_text_is_deterministic() {
        assert_eq!(embed_text("same text", 32), embed_text("same text", 32));
        assert_ne!(embed_text("a", 32), embed_text("b", 32));
    }
}
