//! Claim: the immutable record a caller submits for verification.

use serde::{Deserialize, Serialize};

/// Closed vertical set a claim may be tagged with. Each domain carries its
/// own Constitutional Halt threshold (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Vetproof,
    Legal,
    Finance,
    Health,
    Education,
    Aviation,
}

impl Domain {
    /// Default Constitutional Halt threshold for this domain (spec.md §6).
    pub fn default_halt_threshold(self) -> f64 {
        match self {
            Domain::Vetproof => 0.67,
            Domain::Legal => 0.70,
            Domain::Finance => 0.75,
            Domain::Health => 0.80,
            Domain::Education => 0.65,
            Domain::Aviation => 0.85,
        }
    }
}

/// Caller-supplied urgency; `High` forces a HITL review even when the
/// consensus engine would otherwise accept the verdict outright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// A single piece of supporting evidence attached to a claim.
pub type EvidenceFragment = String;

/// Immutable record supplied by a caller. Never mutated after creation —
/// the orchestrator and consensus engine only ever read it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceFragment>,
    pub domain: Option<Domain>,
    #[serde(default)]
    pub priority: Priority,
}

impl Claim {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            evidence: Vec::new(),
            domain: None,
            priority: Priority::default(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<EvidenceFragment>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Concatenated evidence fragments, as consumed by the Embed stage.
    pub fn evidence_blob(&self) -> String {
        self.evidence.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_thresholds_match_spec_defaults() {
        assert_eq!(Domain::Vetproof.default_halt_threshold(), 0.67);
        assert_eq!(Domain::Health.default_halt_threshold(), 0.80);
        assert_eq!(Domain::Aviation.default_halt_threshold(), 0.85);
    }

    #[test]
    fn claim_builder_round_trips() {
        let c = Claim::new("c1", "some text")
            .with_evidence(vec!["a".into(), "b".into()])
            .with_domain(Domain::Vetproof)
            .with_priority(Priority::High);
        assert_eq!(c.evidence_blob(), "a\nb");
        assert_eq!(c.priority, Priority::High);
    }

    #[test]
    fn domain_serializes_lowercase() {
        let json = serde_json::to_string(&Domain::Vetproof).unwrap();
        assert_eq!(json, "\"vetproof\"");
    }
}
