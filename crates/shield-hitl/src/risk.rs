//! Decides whether a claim needs human review (spec.md §4.2 "Interactions
//! with HITL").

use serde::{Deserialize, Serialize};
use shield_types::Priority;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// A HITL Ticket is opened when any one of: risk is high/critical, the
/// Constitutional Halt fired, the caller marked the claim priority=high, or
/// domain policy mandates review regardless of risk.
pub fn requires_review(risk: RiskLevel, constitutional_halt: bool, priority: Priority, domain_mandates_review: bool) -> bool {
    matches!(risk, RiskLevel::High | RiskLevel::Critical)
        || constitutional_halt
        || priority == Priority::High
        || domain_mandates_review
}
