//! Sign stage (spec.md §4.2 step 6): compose the canonical proof bundle,
//! hash it, link it to the domain's chain tip, and write the Proof Record
//! atomically.

use shield_evidence::{EvidenceStore, StoreError};
use shield_types::{ProofBundle, ProofRecord, StageOutputs};
use thiserror::Error;

use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum SignError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Retryable for SignError {
    fn is_retryable(&self) -> bool {
        matches!(self, SignError::Store(StoreError::CasExhausted(_)) | SignError::Store(StoreError::Storage(_)))
    }
}

#[derive(Clone)]
pub struct SignInputs {
    pub claim_id: String,
    pub instance_id: String,
    pub domain: String,
    pub pipeline_version: String,
    pub stages: StageOutputs,
    pub final_verdict: String,
    pub final_confidence: f64,
    pub trust_score: f64,
    pub halt_reasons: Vec<String>,
    pub duration_ms: u64,
}

/// Links every bundle to the domain's live chain tip at the moment it is
/// actually appended (spec.md §3: "the second's previous_hash equals the
/// first's proof_hash" must hold for every pair of consecutive records,
/// including under concurrent multi-instance writes to the same domain).
/// A retry of this instance's own Sign attempt after a crash is recognized
/// by `existing_for_instance` and returns the original record unchanged,
/// rather than re-deriving a previous-hash that may have been overtaken by
/// another instance's write in between (spec.md §8: "Running Sign twice
/// ... yields the same proof_hash and a single Evidence Store record").
pub fn run(store: &EvidenceStore, inputs: SignInputs, timestamp: chrono::DateTime<chrono::Utc>) -> Result<ProofRecord, SignError> {
    if let Some(existing) = store.existing_for_instance(&inputs.domain, &inputs.instance_id)? {
        return Ok(existing);
    }

    let is_halt = inputs.final_verdict == "halt";
    let domain = inputs.domain.clone();
    let instance_id = inputs.instance_id.clone();
    let record = store.append(&domain, &instance_id, move |live_tip| {
        let bundle = ProofBundle {
            claim_id: inputs.claim_id.clone(),
            pipeline_version: inputs.pipeline_version.clone(),
            stages: inputs.stages.clone(),
            verdict: inputs.final_verdict.clone(),
            final_confidence: inputs.final_confidence,
            trust_score: inputs.trust_score,
            timestamp,
            duration_ms: inputs.duration_ms,
            previous_hash: live_tip,
            proof_hash: String::new(),
        }
        .sealed();

        ProofRecord {
            claim_id: inputs.claim_id.clone(),
            instance_id: inputs.instance_id.clone(),
            domain: inputs.domain.clone(),
            verdict: bundle.verdict.clone(),
            confidence: bundle.final_confidence,
            is_halt,
            halt_reasons: inputs.halt_reasons.clone(),
            bundle,
            created_at: timestamp,
        }
    })?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs_for(instance_id: &str, verdict: &str) -> SignInputs {
        SignInputs {
            claim_id: "c1".into(),
            instance_id: instance_id.to_string(),
            domain: "vetproof".into(),
            pipeline_version: "1.0.0".into(),
            stages: StageOutputs::default(),
            final_verdict: verdict.to_string(),
            final_confidence: 0.9,
            trust_score: 1.0,
            halt_reasons: vec![],
            duration_ms: 10,
        }
    }

    fn inputs(verdict: &str) -> SignInputs {
        inputs_for("i1", verdict)
    }

    fn ts() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn first_proof_chains_to_genesis_and_verifies() {
        let store = EvidenceStore::open_temporary().unwrap();
        let rec = run(&store, inputs("verified"), ts()).unwrap();
        assert_eq!(rec.bundle.previous_hash, shield_evidence::GENESIS_HASH);
        assert!(rec.bundle.verify_hash());
        assert!(!rec.is_halt);
    }

    #[test]
    fn halt_verdict_is_flagged_on_the_record() {
        let store = EvidenceStore::open_temporary().unwrap();
        let rec = run(&store, inputs("halt"), ts()).unwrap();
        assert!(rec.is_halt);
    }

    #[test]
    fn rerunning_sign_for_the_same_instance_after_a_crash_returns_the_original_record() {
        let store = EvidenceStore::open_temporary().unwrap();
        let first = run(&store, inputs("verified"), ts()).unwrap();
        // A second, unrelated instance advances the domain tip in between.
        run(&store, inputs_for("i2", "verified"), ts()).unwrap();
        // Retrying the *original* instance's Sign (as if its success
        // response was lost before a crash) returns the same record rather
        // than appending a second one linked after the intervening write.
        let replay = run(&store, inputs("verified"), ts()).unwrap();
        assert_eq!(first.bundle.proof_hash, replay.bundle.proof_hash);
        assert_ne!(store.chain_tip("vetproof").unwrap(), first.bundle.proof_hash);
    }

    #[test]
    fn two_instances_chain_linearly_regardless_of_submission_order() {
        let store = EvidenceStore::open_temporary().unwrap();
        let first = run(&store, inputs_for("i1", "verified"), ts()).unwrap();
        let second = run(&store, inputs_for("i2", "verified"), ts()).unwrap();
        assert_eq!(second.bundle.previous_hash, first.bundle.proof_hash);
    }
}
