//! Proof Record: the immutable artifact written at the Sign stage, and the
//! canonical bundle it's hashed from (spec.md §3, §6).

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_json, sha256_hex};

/// Per-stage outputs embedded in a proof bundle. Each field is the stage's
/// own output serialized as JSON — the bundle doesn't need to know the
/// concrete stage types, only that they're canonically serializable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    pub sanitize: serde_json::Value,
    pub embed: serde_json::Value,
    pub search: serde_json::Value,
    pub verify: serde_json::Value,
    pub detect: serde_json::Value,
}

/// The canonical, hashable proof bundle (spec.md §6 "Proof bundle format").
/// `proof_hash` is always computed with this field cleared to `""` first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub claim_id: String,
    pub pipeline_version: String,
    pub stages: StageOutputs,
    pub verdict: String,
    pub final_confidence: f64,
    pub trust_score: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub previous_hash: String,
    pub proof_hash: String,
}

/// Genesis marker for a domain's first proof in its chain (spec.md §3).
pub const GENESIS_HASH: &str = "genesis";

impl ProofBundle {
    /// Compute `proof_hash`: SHA-256 of the canonical bundle with the
    /// `proof_hash` field cleared (spec.md §6, testable property 3).
    pub fn compute_hash(&self) -> String {
        let mut cleared = self.clone();
        cleared.proof_hash = String::new();
        sha256_hex(canonical_json(&cleared).as_bytes())
    }

    /// Stamp `proof_hash` from the bundle's own canonical content.
    pub fn sealed(mut self) -> Self {
        self.proof_hash = self.compute_hash();
        self
    }

    pub fn verify_hash(&self) -> bool {
        self.proof_hash == self.compute_hash()
    }
}

/// Stored, immutable record — one per completed Pipeline Instance
/// (spec.md §3 invariants).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub claim_id: String,
    pub instance_id: String,
    pub domain: String,
    pub verdict: String,
    pub confidence: f64,
    pub is_halt: bool,
    pub halt_reasons: Vec<String>,
    pub bundle: ProofBundle,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> ProofBundle {
        ProofBundle {
            claim_id: "c1".into(),
            pipeline_version: "1.0.0".into(),
            stages: StageOutputs::default(),
            verdict: "verified".into(),
            final_confidence: 0.9,
            trust_score: 1.0,
            timestamp: chrono::Utc::now(),
            duration_ms: 42,
            previous_hash: GENESIS_HASH.into(),
            proof_hash: String::new(),
        }
    }

    #[test]
    fn sealed_bundle_hash_verifies() {
        let bundle = sample_bundle().sealed();
        assert!(bundle.verify_hash());
    }

    #[test]
    fn hash_changes_when_content_changes() {
        let a = sample_bundle().sealed();
        let mut b = sample_bundle();
        b.final_confidence = 0.5;
        let b = b.sealed();
        assert_ne!(a.proof_hash, b.proof_hash);
    }

    #[test]
    fn hash_is_stable_across_repeated_computation() {
        let bundle = sample_bundle();
        assert_eq!(bundle.compute_hash(), bundle.compute_hash());
    }
}
