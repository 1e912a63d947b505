//! The BFT / Variance-Halt / Constitutional-Halt algorithm (spec.md §4.1).

use std::collections::BTreeMap;

use chrono::Utc;
use shield_types::{ConsensusSnapshot, Verdict, Vote};

/// Fixed-point margin applied so floating-point representation noise near a
/// threshold resolves on the halt-favoring side, per spec.md §4.1: "All
/// arithmetic uses IEEE-754 double precision; comparisons that would be
/// affected by representational noise near threshold boundaries are
/// resolved by applying a single fixed ε = 1e-9 margin on the halt-favoring
/// side (halts win ties)."
pub const EPSILON: f64 = 1e-9;

/// Domain-dependent halt thresholds and the default variance ceiling.
#[derive(Clone, Copy, Debug)]
pub struct HaltConfig {
    pub variance_ceiling: f64,
    pub constitutional_threshold: f64,
    pub min_quorum_votes: usize,
}

impl Default for HaltConfig {
    fn default() -> Self {
        Self {
            variance_ceiling: 0.25,
            constitutional_threshold: 0.67,
            min_quorum_votes: crate::MIN_QUORUM_VOTES,
        }
    }
}

/// Recompute the full Consensus Snapshot from the current vote set
/// (spec.md §4.1, testable property 1: "a pure function of the final
/// unique-by-model subset").
///
/// `votes` must already be deduplicated by model id (later arrival wins) —
/// see `ConsensusEngine::submit_vote`, which upserts into a `BTreeMap`
/// before calling this.
pub fn compute_snapshot(session_id: &str, votes: &BTreeMap<String, Vote>, cfg: HaltConfig) -> ConsensusSnapshot {
    let valid: Vec<&Vote> = votes.values().filter(|v| v.verdict.is_valid_opinion()).collect();
    let total_weight: f64 = valid.iter().map(|v| v.weight).sum();

    if valid.is_empty() || total_weight <= 0.0 {
        return ConsensusSnapshot {
            session_id: session_id.to_string(),
            majority_verdict: None,
            weighted_confidence: 0.0,
            std_dev: 0.0,
            agreement_ratio: 0.0,
            bft_reached: false,
            variance_halt: false,
            constitutional_halt: false,
            no_quorum: true,
            valid_vote_count: 0,
            final_verdict: "halt".to_string(),
            updated_at: Utc::now(),
        };
    }

    // Step 1: per-verdict weight, majority by weight with lexicographic tie-break.
    let mut weight_by_verdict: BTreeMap<&'static str, (Verdict, f64)> = BTreeMap::new();
    for v in &valid {
        let entry = weight_by_verdict.entry(v.verdict.tag()).or_insert((v.verdict, 0.0));
        entry.1 += v.weight;
    }
    let (majority_verdict, majority_weight) = weight_by_verdict
        .iter()
        .max_by(|a, b| {
            a.1 .1
                .partial_cmp(&b.1 .1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(a.0)) // BTreeMap already iterates in tag order; lower tag wins ties
        })
        .map(|(_, (verdict, weight))| (*verdict, *weight))
        .expect("valid is non-empty");

    // Step 2: agreement ratio.
    let agreement_ratio = majority_weight / total_weight;

    // Step 3: weighted-mean confidence.
    let weighted_confidence = valid.iter().map(|v| v.weight * v.confidence).sum::<f64>() / total_weight;

    // Step 4: standard deviation over *unweighted* confidences — a
    // deliberate, spec-mandated quirk (spec.md §9 design note) distinct
    // from the weighted mean used above.
    let std_dev = unweighted_std_dev(&valid);

    // Step 5: BFT quorum (spec.md §4.1 item 5): reached iff
    // α ≥ ⌈2|V|+2⌉ / (3|V|) and |V| ≥ the minimum quorum size. At |V|=3
    // that threshold is 8/9 ≈ 0.889, stricter than plain 2/3 agreement.
    // Ties resolve on the halt-favoring side, so the boundary itself counts
    // as not-reached: require clearing the threshold by EPSILON.
    let v = valid.len() as f64;
    let bft_threshold = (2.0 * v + 2.0).ceil() / (3.0 * v);
    let bft_reached = valid.len() >= cfg.min_quorum_votes && agreement_ratio >= bft_threshold + EPSILON;

    // Step 6: Variance Halt — ties (σ == ceiling) favor halting.
    let variance_halt = std_dev >= cfg.variance_ceiling - EPSILON;

    // Step 7: Constitutional Halt — ties (c̄ == threshold) favor halting.
    let constitutional_halt = weighted_confidence <= cfg.constitutional_threshold + EPSILON;

    // Step 8: final verdict.
    let halted = variance_halt || constitutional_halt || !bft_reached;
    let final_verdict = if halted {
        "halt".to_string()
    } else {
        majority_verdict.tag().to_string()
    };

    ConsensusSnapshot {
        session_id: session_id.to_string(),
        majority_verdict: Some(majority_verdict),
        weighted_confidence,
        std_dev,
        agreement_ratio,
        bft_reached,
        variance_halt,
        constitutional_halt,
        no_quorum: valid.len() < cfg.min_quorum_votes,
        valid_vote_count: valid.len(),
        final_verdict,
        updated_at: Utc::now(),
    }
}

fn unweighted_std_dev(valid: &[&Vote]) -> f64 {
    if valid.len() <= 1 {
        return 0.0;
    }
    let n = valid.len() as f64;
    let mean = valid.iter().map(|v| v.confidence).sum::<f64>() / n;
    let variance = valid.iter().map(|v| (v.confidence - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_types::ModelId;

    fn vote(model: &str, verdict: Verdict, confidence: f64, weight: f64) -> Vote {
        Vote {
            model_id: ModelId(model.to_string()),
            verdict,
            confidence,
            coherence: confidence,
            reasoning: String::new(),
            weight,
            timestamp: Utc::now(),
        }
    }

    fn votes_map(votes: Vec<Vote>) -> BTreeMap<String, Vote> {
        votes.into_iter().map(|v| (v.model_id.0.clone(), v)).collect()
    }

    #[test]
    fn scenario_a_clean_verify() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.90, 1.0),
            vote("m2", Verdict::Verified, 0.88, 1.2),
            vote("m3", Verdict::Verified, 0.86, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!(snap.bft_reached);
        assert!(!snap.variance_halt);
        assert!(!snap.constitutional_halt);
        assert_eq!(snap.final_verdict, "verified");
        assert!((snap.agreement_ratio - 1.0).abs() < 1e-9);
        assert!((snap.weighted_confidence - 0.881).abs() < 1e-2);
    }

    #[test]
    fn scenario_b_variance_halt() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.95, 1.0),
            vote("m2", Verdict::Unverified, 0.30, 1.0),
            vote("m3", Verdict::Verified, 0.85, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!(snap.std_dev > 0.25);
        assert!(snap.variance_halt);
        assert_eq!(snap.final_verdict, "halt");
    }

    #[test]
    fn scenario_c_constitutional_halt() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.73, 1.0),
            vote("m2", Verdict::Verified, 0.72, 1.0),
            vote("m3", Verdict::Verified, 0.71, 1.0),
        ]);
        let cfg = HaltConfig {
            constitutional_threshold: 0.80,
            ..HaltConfig::default()
        };
        let snap = compute_snapshot("c1", &votes, cfg);
        assert!(snap.bft_reached);
        assert!(snap.std_dev < 0.25);
        assert!(snap.constitutional_halt);
        assert_eq!(snap.final_verdict, "halt");
    }

    #[test]
    fn two_of_three_weighted_agreement_at_default_model_weights_misses_the_literal_threshold() {
        // Mirrors shield-pipeline's shipped model weights (1.0, 1.2, 1.0):
        // two-of-three weighted agreement is 2.2/3.2 ≈ 0.6875, well above
        // plain 2/3 but short of the literal ⌈2|V|+2⌉/(3|V|) = 8/9 ≈ 0.889
        // required at |V|=3.
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.9, 1.0),
            vote("m2", Verdict::Verified, 0.9, 1.2),
            vote("m3", Verdict::Unverified, 0.9, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!((snap.agreement_ratio - 2.2 / 3.2).abs() < 1e-9);
        assert!(!snap.bft_reached);
        assert_eq!(snap.final_verdict, "halt");
    }

    #[test]
    fn boundary_exactly_two_thirds_is_not_bft() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.9, 1.0),
            vote("m2", Verdict::Verified, 0.9, 1.0),
            vote("m3", Verdict::Unverified, 0.9, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!((snap.agreement_ratio - (2.0 / 3.0)).abs() < 1e-9);
        assert!(!snap.bft_reached);
        assert_eq!(snap.final_verdict, "halt");
    }

    #[test]
    fn boundary_std_dev_equal_to_ceiling_halts() {
        // Construct confidences with population std dev exactly 0.25.
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.25, 1.0),
            vote("m2", Verdict::Verified, 0.75, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!((snap.std_dev - 0.25).abs() < 1e-9);
        assert!(snap.variance_halt);
    }

    #[test]
    fn boundary_confidence_equal_to_threshold_halts() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.67, 1.0),
            vote("m2", Verdict::Verified, 0.67, 1.0),
            vote("m3", Verdict::Verified, 0.67, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!(snap.constitutional_halt);
    }

    #[test]
    fn property_all_confidence_one_has_no_variance_halt() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 1.0, 1.0),
            vote("m2", Verdict::Verified, 1.0, 1.0),
            vote("m3", Verdict::Verified, 1.0, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!(!snap.variance_halt);
    }

    #[test]
    fn property_fewer_than_three_votes_never_reaches_bft() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.99, 1.0),
            vote("m2", Verdict::Verified, 0.99, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert!(!snap.bft_reached);
        assert!(snap.no_quorum);
    }

    #[test]
    fn error_votes_are_excluded_from_the_valid_set() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.9, 1.0),
            vote("m2", Verdict::Verified, 0.9, 1.0),
            vote("m3", Verdict::Verified, 0.9, 1.0),
            vote("m4", Verdict::Error, 0.0, 1.0),
        ]);
        let snap = compute_snapshot("c1", &votes, HaltConfig::default());
        assert_eq!(snap.valid_vote_count, 3);
    }

    #[test]
    fn later_vote_from_same_model_overwrites_earlier() {
        let mut map = BTreeMap::new();
        map.insert("m1".to_string(), vote("m1", Verdict::Verified, 0.9, 1.0));
        map.insert("m1".to_string(), vote("m1", Verdict::Unverified, 0.9, 1.0));
        assert_eq!(map.len(), 1);
        assert_eq!(map["m1"].verdict, Verdict::Unverified);
    }

    #[test]
    fn resubmitting_the_same_vote_is_idempotent() {
        let votes = votes_map(vec![
            vote("m1", Verdict::Verified, 0.9, 1.0),
            vote("m2", Verdict::Verified, 0.9, 1.0),
            vote("m3", Verdict::Verified, 0.9, 1.0),
        ]);
        let snap1 = compute_snapshot("c1", &votes, HaltConfig::default());
        let snap2 = compute_snapshot("c1", &votes, HaltConfig::default());
        assert_eq!(snap1.final_verdict, snap2.final_verdict);
        assert_eq!(snap1.agreement_ratio, snap2.agreement_ratio);
    }
}
