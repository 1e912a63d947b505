//! Orchestrator-local configuration: per-stage retry policies and timeouts
//! (spec.md §4.2's retry table, §5 "Timeouts"). Kept separate from
//! `shield-config::PipelineConfig` — that crate owns *layered* config
//! loading (file/env/defaults) for the binary; this struct is the
//! orchestrator's own parameter object, the way `knhk-workflow-engine`'s
//! executor takes its own config distinct from the top-level app config.

use std::time::Duration;

use shield_types::Stage;

use crate::retry::{Backoff, RetryPolicy};

#[derive(Clone, Copy, Debug)]
pub struct StageTiming {
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct OrchestratorConfig {
    pub verify_concurrency: usize,
    pub model_call_timeout: Duration,
    pub hitl_default: Duration,
    pub variance_ceiling: f64,
    pub sanitize: StageTiming,
    pub embed: StageTiming,
    pub search: StageTiming,
    pub verify: StageTiming,
    pub detect: StageTiming,
    pub sign: StageTiming,
}

impl OrchestratorConfig {
    pub fn timing_for(&self, stage: Stage) -> StageTiming {
        match stage {
            Stage::Sanitize => self.sanitize,
            Stage::Embed => self.embed,
            Stage::Search => self.search,
            Stage::Verify => self.verify,
            Stage::Detect => self.detect,
            Stage::Sign => self.sign,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            verify_concurrency: 8,
            model_call_timeout: Duration::from_secs(30),
            hitl_default: Duration::from_secs(7 * 24 * 3600),
            variance_ceiling: 0.25,
            sanitize: StageTiming {
                retry: RetryPolicy::new(2, 3, Backoff::Exponential),
                timeout: Duration::from_secs(30),
            },
            embed: StageTiming {
                retry: RetryPolicy::new(3, 5, Backoff::Linear),
                timeout: Duration::from_secs(60),
            },
            search: StageTiming {
                retry: RetryPolicy::new(2, 3, Backoff::Linear),
                timeout: Duration::from_secs(30),
            },
            verify: StageTiming {
                retry: RetryPolicy::new(3, 10, Backoff::Exponential),
                timeout: Duration::from_secs(120),
            },
            detect: StageTiming {
                retry: RetryPolicy::new(2, 5, Backoff::Linear),
                timeout: Duration::from_secs(60),
            },
            sign: StageTiming {
                retry: RetryPolicy::new(2, 5, Backoff::Exponential),
                timeout: Duration::from_secs(30),
            },
        }
    }
}
