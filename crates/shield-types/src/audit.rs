//! Audit Event: an append-only ledger row (spec.md §3, §4.5).

use serde::{Deserialize, Serialize};

/// Closed set of event kinds the ledger accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEventKind {
    Submit,
    StageStart,
    StageComplete,
    StageFail,
    HaltTriggered,
    HitlOpen,
    HitlResolved,
    ProofSigned,
}

impl AuditEventKind {
    /// Per spec.md §4.5/§7: these two kinds must be durable before the
    /// caller sees success; everything else is best-effort.
    pub fn requires_durability(self) -> bool {
        matches!(self, AuditEventKind::StageComplete | AuditEventKind::ProofSigned)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub claim_id: String,
    pub kind: AuditEventKind,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AuditEvent {
    pub fn new(claim_id: impl Into<String>, kind: AuditEventKind, payload: serde_json::Value) -> Self {
        Self {
            claim_id: claim_id.into(),
            kind,
            payload,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durability_classification_matches_spec() {
        assert!(AuditEventKind::StageComplete.requires_durability());
        assert!(AuditEventKind::ProofSigned.requires_durability());
        assert!(!AuditEventKind::Submit.requires_durability());
        assert!(!AuditEventKind::HitlOpen.requires_durability());
    }
}
