//! Pipeline Instance: one run of the fixed stage sequence for one claim
//! (spec.md §3, §4.2).

use serde::{Deserialize, Serialize};

/// Fixed, ordered stage sequence. `Stage::index` gives the total order used
/// to enforce "never moves backward" (spec.md §3 invariants).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sanitize,
    Embed,
    Search,
    Verify,
    Detect,
    Sign,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::Sanitize,
        Stage::Embed,
        Stage::Search,
        Stage::Verify,
        Stage::Detect,
        Stage::Sign,
    ];

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).expect("Stage::ORDER is exhaustive")
    }

    pub fn next(self) -> Option<Stage> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Sanitize => "sanitize",
            Stage::Embed => "embed",
            Stage::Search => "search",
            Stage::Verify => "verify",
            Stage::Detect => "detect",
            Stage::Sign => "sign",
        }
    }
}

/// Terminal and in-flight states a Pipeline Instance can be in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PipelineStatus {
    Running { stage: Stage },
    AwaitingHitl { ticket_id: String },
    Completed,
    Failed { stage: Stage, reason: String },
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Completed | PipelineStatus::Failed { .. } | PipelineStatus::Cancelled)
    }
}

/// One entry in a Pipeline Instance's monotonic stage log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageLogEntry {
    pub stage: Stage,
    pub attempt: u32,
    pub outcome: StageOutcome,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Started,
    Completed,
    Failed(String),
}

/// One per claim run through the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineInstance {
    pub instance_id: String,
    pub claim_id: String,
    pub status: PipelineStatus,
    pub attempts: std::collections::HashMap<String, u32>,
    pub last_error: Option<String>,
    pub stage_log: Vec<StageLogEntry>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PipelineInstance {
    pub fn new(instance_id: impl Into<String>, claim_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            instance_id: instance_id.into(),
            claim_id: claim_id.into(),
            status: PipelineStatus::Running { stage: Stage::Sanitize },
            attempts: std::collections::HashMap::new(),
            last_error: None,
            stage_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempt_count(&self, stage: Stage) -> u32 {
        *self.attempts.get(stage.name()).unwrap_or(&0)
    }

    pub fn record_attempt(&mut self, stage: Stage) -> u32 {
        let count = self.attempts.entry(stage.name().to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Enforces "never moves backward in stage order" (spec.md §3 invariants).
    pub fn advance_to(&mut self, stage: Stage) {
        if let PipelineStatus::Running { stage: current } = &self.status {
            debug_assert!(stage.index() >= current.index(), "pipeline stage order violated");
        }
        self.status = PipelineStatus::Running { stage };
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_total() {
        assert_eq!(Stage::Sanitize.next(), Some(Stage::Embed));
        assert_eq!(Stage::Sign.next(), None);
        assert!(Stage::Sanitize.index() < Stage::Sign.index());
    }

    #[test]
    fn instance_starts_at_sanitize() {
        let inst = PipelineInstance::new("i1", "c1");
        assert_eq!(inst.status, PipelineStatus::Running { stage: Stage::Sanitize });
    }

    #[test]
    fn attempt_count_increments_per_stage() {
        let mut inst = PipelineInstance::new("i1", "c1");
        assert_eq!(inst.record_attempt(Stage::Embed), 1);
        assert_eq!(inst.record_attempt(Stage::Embed), 2);
        assert_eq!(inst.attempt_count(Stage::Sanitize), 0);
    }
}
