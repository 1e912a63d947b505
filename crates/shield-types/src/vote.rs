//! Vote and Consensus Snapshot: the opinions a Voting Session collects and
//! the derived verdict computed over them (spec.md §3, §4.1).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypeError;

/// Opaque identifier for a verifier model.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        ModelId(s.to_string())
    }
}

/// Verdict tag drawn from a closed set. Lexicographic order on the variant
/// names (via the derived `Ord` over the string form below) is used to
/// break majority ties deterministically — see `Verdict::tag`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Unverified,
    InsufficientEvidence,
    NeedsReview,
    Error,
}

impl Verdict {
    /// Lowercase, underscore-separated tag used for lexicographic tie-break
    /// and for wire serialization.
    pub fn tag(self) -> &'static str {
        match self {
            Verdict::Verified => "verified",
            Verdict::Unverified => "unverified",
            Verdict::InsufficientEvidence => "insufficient_evidence",
            Verdict::NeedsReview => "needs_review",
            Verdict::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Ok(match s {
            "verified" => Verdict::Verified,
            "unverified" => Verdict::Unverified,
            "insufficient_evidence" => Verdict::InsufficientEvidence,
            "needs_review" => Verdict::NeedsReview,
            "error" => Verdict::Error,
            other => {
                return Err(TypeError::UnknownEnumValue {
                    field: "verdict",
                    value: other.to_string(),
                })
            }
        })
    }

    /// Votes tagged `Error` are excluded from the valid-vote set `V` used
    /// by the consensus algorithm (spec.md §4.1).
    pub fn is_valid_opinion(self) -> bool {
        !matches!(self, Verdict::Error)
    }
}

/// One model's opinion on a claim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub model_id: ModelId,
    pub verdict: Verdict,
    pub confidence: f64,
    pub coherence: f64,
    pub reasoning: String,
    pub weight: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Upper bound on `reasoning` length (spec.md §3: "bounded length").
pub const MAX_REASONING_CHARS: usize = 4096;

impl Vote {
    /// Validate the ranges and enum constraints spec.md §4.1 names:
    /// confidence/coherence ∈ [0,1], weight > 0, reasoning bounded.
    pub fn validate(&self) -> Result<(), TypeError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(TypeError::OutOfRange {
                field: "confidence",
                lo: 0.0,
                hi: 1.0,
                value: self.confidence,
            });
        }
        if !(0.0..=1.0).contains(&self.coherence) {
            return Err(TypeError::OutOfRange {
                field: "coherence",
                lo: 0.0,
                hi: 1.0,
                value: self.coherence,
            });
        }
        if self.weight <= 0.0 {
            return Err(TypeError::NonPositiveWeight(self.weight));
        }
        if self.reasoning.chars().count() > MAX_REASONING_CHARS {
            return Err(TypeError::OutOfRange {
                field: "reasoning_len",
                lo: 0.0,
                hi: MAX_REASONING_CHARS as f64,
                value: self.reasoning.chars().count() as f64,
            });
        }
        Ok(())
    }
}

/// Derived consensus result, recomputed on every new vote (spec.md §3/§4.1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    pub session_id: String,
    pub majority_verdict: Option<Verdict>,
    pub weighted_confidence: f64,
    pub std_dev: f64,
    pub agreement_ratio: f64,
    pub bft_reached: bool,
    pub variance_halt: bool,
    pub constitutional_halt: bool,
    pub no_quorum: bool,
    pub valid_vote_count: usize,
    /// "halt" if either halt flag is set or BFT was not reached; otherwise
    /// the majority verdict's tag (spec.md §4.1 step 8).
    pub final_verdict: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ConsensusSnapshot {
    pub fn is_halted(&self) -> bool {
        self.final_verdict == "halt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_tag_round_trips() {
        for v in [
            Verdict::Verified,
            Verdict::Unverified,
            Verdict::InsufficientEvidence,
            Verdict::NeedsReview,
            Verdict::Error,
        ] {
            assert_eq!(Verdict::parse(v.tag()).unwrap(), v);
        }
    }

    #[test]
    fn vote_validate_rejects_out_of_range_confidence() {
        let mut v = sample_vote();
        v.confidence = 1.5;
        assert!(v.validate().is_err());
    }

    #[test]
    fn vote_validate_rejects_non_positive_weight() {
        let mut v = sample_vote();
        v.weight = 0.0;
        assert!(v.validate().is_err());
    }

    #[test]
    fn error_verdict_is_excluded_from_valid_opinions() {
        assert!(!Verdict::Error.is_valid_opinion());
        assert!(Verdict::Verified.is_valid_opinion());
    }

    fn sample_vote() -> Vote {
        Vote {
            model_id: "m1".into(),
            verdict: Verdict::Verified,
            confidence: 0.9,
            coherence: 0.9,
            reasoning: "looks good".into(),
            weight: 1.0,
            timestamp: chrono::Utc::now(),
        }
    }
}
