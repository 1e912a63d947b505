//! Detect stage (spec.md §4.2 step 5): derive trust flags from the
//! Consensus Snapshot and upstream signals, and decide whether a halt is
//! required.

use serde::{Deserialize, Serialize};
use shield_types::ConsensusSnapshot;

/// Threshold below which Detect's own `trust-halt` flag fires
/// independently of the flag-count-3 rule (spec.md §4.2 names
/// `trust-halt` but not its threshold; DESIGN.md Open Question: resolved
/// here as `trust < 0.6`, chosen so a 2-flag trust score of 0.6 alone is
/// enough to halt before the flag-count-3 threshold would).
pub const TRUST_HALT_THRESHOLD: f64 = 0.6;

/// Variance ceiling used only for the `stdDev > σ_var` flag (mirrors the
/// consensus engine's own `HaltConfig::variance_ceiling`, kept in sync by
/// the orchestrator passing the same value to both).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectOutput {
    pub flags: Vec<String>,
    pub trust: f64,
    pub trust_halt: bool,
    pub halt_required: bool,
}

pub fn run(snapshot: &ConsensusSnapshot, variance_ceiling: f64, claim_evidence_similarity: f32) -> DetectOutput {
    let mut flags = Vec::new();

    if snapshot.std_dev > variance_ceiling {
        flags.push("std_dev_over_ceiling".to_string());
    }
    if !snapshot.bft_reached {
        flags.push("bft_not_reached".to_string());
    }
    if snapshot.weighted_confidence < 0.5 {
        flags.push("confidence_under_half".to_string());
    }
    if snapshot.std_dev > 0.30 {
        flags.push("std_dev_over_0_30".to_string());
    }
    if claim_evidence_similarity < 0.4 {
        flags.push("claim_evidence_similarity_under_0_4".to_string());
    }

    let flag_count = flags.len();
    let trust = (1.0 - 0.2 * flag_count as f64).max(0.0);
    let trust_halt = trust < TRUST_HALT_THRESHOLD;
    let halt_required = trust_halt || snapshot.variance_halt || flag_count >= 3;

    DetectOutput {
        flags,
        trust,
        trust_halt,
        halt_required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_types::Verdict;

    fn snapshot(std_dev: f64, weighted_confidence: f64, bft_reached: bool, variance_halt: bool) -> ConsensusSnapshot {
        ConsensusSnapshot {
            session_id: "s1".into(),
            majority_verdict: Some(Verdict::Verified),
            weighted_confidence,
            std_dev,
            agreement_ratio: 1.0,
            bft_reached,
            variance_halt,
            constitutional_halt: false,
            no_quorum: false,
            valid_vote_count: 3,
            final_verdict: "verified".into(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn clean_snapshot_has_no_flags_and_full_trust() {
        let out = run(&snapshot(0.02, 0.9, true, false), 0.25, 0.9);
        assert!(out.flags.is_empty());
        assert_eq!(out.trust, 1.0);
        assert!(!out.halt_required);
    }

    #[test]
    fn three_flags_forces_halt_regardless_of_trust_threshold() {
        // std_dev_over_ceiling + bft_not_reached + confidence_under_half + std_dev_over_0_30.
        let out = run(&snapshot(0.35, 0.4, false, false), 0.25, 0.9);
        assert!(out.flags.len() >= 3);
        assert!(out.halt_required);
    }

    #[test]
    fn variance_halt_from_the_consensus_engine_propagates() {
        let out = run(&snapshot(0.02, 0.9, true, true), 0.25, 0.9);
        assert!(out.halt_required);
    }

    #[test]
    fn low_similarity_is_flagged() {
        let out = run(&snapshot(0.02, 0.9, true, false), 0.25, 0.2);
        assert!(out.flags.contains(&"claim_evidence_similarity_under_0_4".to_string()));
    }
}
