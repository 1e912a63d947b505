//! Drives one Pipeline Instance through the fixed stage sequence with
//! durable checkpointing, per-stage retry, and HITL suspension (spec.md
//! §4.2). Grounded on `knhk-workflow-engine::executor`/`orchestrator`'s
//! stage-machine shape.

use std::sync::Arc;

use chrono::Utc;
use shield_consensus::{ConsensusEngine, HaltConfig};
use shield_evidence::EvidenceStore;
use shield_hitl::{requires_review, HitlGate, RiskLevel};
use shield_ledger::{AuditLedger, Cache};
use shield_types::{
    AuditEvent, AuditEventKind, Claim, Domain, PipelineInstance, PipelineStatus, ProofRecord, Stage, StageOutputs, TicketStatus,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::deps::{ModelGateway, VectorIndex};
use crate::instance_store::InstanceStore;
use crate::models::ModelProfile;
use crate::retry::run_with_retry;
use crate::stages::{detect, embed, sanitize, search, sign, verify};

#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error("stage {stage:?} failed after retry exhaustion: {reason}")]
    StageFailed { stage: Stage, reason: String },

    #[error("stage {stage:?} exceeded its timeout")]
    StageTimeout { stage: Stage },

    #[error("hitl gate error: {0}")]
    Hitl(String),

    #[error("audit ledger error: {0}")]
    Audit(String),

    #[error("instance checkpoint store error: {0}")]
    Instance(String),
}

/// Cache TTL for a completed claim's proof bundle artifact (spec.md §4.5:
/// "TTL bounds staleness"); not spec-mandated to a specific number, chosen
/// in line with the claim's own HITL review window scale.
const PROOF_CACHE_TTL: chrono::Duration = chrono::Duration::hours(1);

pub struct PipelineOrchestrator {
    consensus: ConsensusEngine,
    evidence: Arc<EvidenceStore>,
    ledger: Arc<AuditLedger>,
    cache: Cache,
    hitl: HitlGate,
    vector_index: Arc<dyn VectorIndex>,
    model_gateway: Arc<dyn ModelGateway>,
    models: Vec<ModelProfile>,
    config: OrchestratorConfig,
    instances: Arc<InstanceStore>,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        consensus: ConsensusEngine,
        evidence: Arc<EvidenceStore>,
        ledger: Arc<AuditLedger>,
        cache: Cache,
        hitl: HitlGate,
        vector_index: Arc<dyn VectorIndex>,
        model_gateway: Arc<dyn ModelGateway>,
        models: Vec<ModelProfile>,
        config: OrchestratorConfig,
        instances: Arc<InstanceStore>,
    ) -> Self {
        Self {
            consensus,
            evidence,
            ledger,
            cache,
            hitl,
            vector_index,
            model_gateway,
            models,
            config,
            instances,
        }
    }

    /// Snapshot of one claim's Pipeline Instance (stage, attempts, status),
    /// for `GET /v1/claims/{id}`. Reads through the durable checkpoint
    /// store, so this survives a restart between a claim's stages.
    pub fn instance(&self, claim_id: &str) -> Option<PipelineInstance> {
        self.instances.get(claim_id).ok().flatten()
    }

    pub fn consensus(&self) -> ConsensusEngine {
        self.consensus.clone()
    }

    pub fn evidence(&self) -> Arc<EvidenceStore> {
        self.evidence.clone()
    }

    pub fn ledger(&self) -> Arc<AuditLedger> {
        self.ledger.clone()
    }

    pub fn cache(&self) -> Cache {
        self.cache.clone()
    }

    pub fn hitl(&self) -> HitlGate {
        self.hitl.clone()
    }

    /// Records an audit event. Durable kinds (`StageComplete`, `ProofSigned`)
    /// surface a ledger failure to the caller — `AuditLedger::record` only
    /// returns `Err` for those once the write genuinely didn't reach disk
    /// (spec.md §4.5/§7). Best-effort kinds are logged and swallowed.
    fn audit(&self, claim_id: &str, kind: AuditEventKind, payload: serde_json::Value) -> Result<(), PipelineError> {
        match self.ledger.record(AuditEvent::new(claim_id, kind, payload)) {
            Ok(()) => Ok(()),
            Err(e) if kind.requires_durability() => Err(PipelineError::Audit(e.to_string())),
            Err(e) => {
                warn!(claim_id, ?kind, error = %e, "audit ledger record failed");
                Ok(())
            }
        }
    }

    fn domain_tag(domain: Option<Domain>) -> String {
        match domain {
            Some(d) => serde_json::to_value(d).unwrap().as_str().unwrap().to_string(),
            None => "vetproof".to_string(),
        }
    }

    fn domain_mandates_review(domain: Option<Domain>) -> bool {
        matches!(domain, Some(Domain::Health) | Some(Domain::Aviation))
    }

    fn risk_level(flag_count: usize) -> RiskLevel {
        match flag_count {
            0 | 1 => RiskLevel::Low,
            2 => RiskLevel::Medium,
            3 | 4 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    /// Runs a claim end to end. A halted verdict is still `Ok` — only
    /// retry-exhausted stage failures are `Err` (spec.md §7: "Halt ...
    /// pipeline succeeds with verdict=halt; this is not an error").
    pub async fn run(&self, claim: Claim) -> Result<ProofRecord, PipelineError> {
        let instance_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let domain = claim.domain;
        let domain_tag = Self::domain_tag(domain);
        let halt_threshold = domain.map(|d| d.default_halt_threshold()).unwrap_or(0.67);

        self.instances
            .insert(&PipelineInstance::new(instance_id.clone(), claim.id.clone()))
            .map_err(|e| PipelineError::Instance(e.to_string()))?;
        self.audit(&claim.id, AuditEventKind::Submit, serde_json::json!({"instance_id": instance_id}))?;

        let sanitize_out = self.stage_checkpoint(&claim.id, Stage::Sanitize, || async {
            Ok::<_, PipelineError>(sanitize::run(&claim.text, &claim.evidence))
        }).await?;

        let embed_out = self
            .stage_checkpoint(&claim.id, Stage::Embed, || async {
                run_with_retry(self.config.embed.retry, || embed::run(self.vector_index.as_ref(), &claim.id, &sanitize_out.redacted_text, &sanitize_out.redacted_evidence))
                    .await
                    .map_err(|e| PipelineError::StageFailed { stage: Stage::Embed, reason: e.to_string() })
            })
            .await?;

        let search_out = self
            .stage_checkpoint(&claim.id, Stage::Search, || async {
                run_with_retry(self.config.search.retry, || search::run(self.vector_index.as_ref(), &claim.id, &embed_out.body_vector))
                    .await
                    .map_err(|e| PipelineError::StageFailed { stage: Stage::Search, reason: e.to_string() })
            })
            .await?;

        let halt_config = HaltConfig {
            variance_ceiling: self.config.variance_ceiling,
            constitutional_threshold: halt_threshold,
            min_quorum_votes: shield_consensus::MIN_QUORUM_VOTES,
        };
        let verify_out = self
            .stage_checkpoint(&claim.id, Stage::Verify, || async {
                run_with_retry(self.config.verify.retry, || {
                    verify::run(
                        &self.consensus,
                        self.model_gateway.as_ref(),
                        &claim.id,
                        halt_config,
                        &self.models,
                        &sanitize_out.redacted_text,
                        &sanitize_out.redacted_evidence,
                        &search_out.similar_claims,
                        self.config.verify_concurrency,
                        self.config.model_call_timeout,
                    )
                })
                .await
                .map_err(|e| PipelineError::StageFailed { stage: Stage::Verify, reason: e.to_string() })
            })
            .await?;

        let detect_out = self
            .stage_checkpoint(&claim.id, Stage::Detect, || async {
                Ok::<_, PipelineError>(detect::run(&verify_out.snapshot, self.config.variance_ceiling, embed_out.claim_evidence_similarity))
            })
            .await?;

        let mut final_verdict = verify_out.snapshot.final_verdict.clone();
        let mut halt_reasons: Vec<String> = detect_out.flags.clone();
        if detect_out.halt_required && final_verdict != "halt" {
            final_verdict = "halt".to_string();
            halt_reasons.push("detect_halt_required".to_string());
        }

        let risk = Self::risk_level(detect_out.flags.len());
        let domain_review = Self::domain_mandates_review(domain);
        let hitl_payload = if requires_review(risk, verify_out.snapshot.constitutional_halt, claim.priority, domain_review) {
            let ticket_id = format!("ticket-{instance_id}");
            let deadline = Utc::now() + chrono::Duration::from_std(self.config.hitl_default).unwrap_or(chrono::Duration::days(7));
            let risk_summary = format!("risk={risk:?} flags={:?}", detect_out.flags);
            self.hitl
                .open_ticket(ticket_id.clone(), claim.id.clone(), instance_id.clone(), risk_summary, deadline)
                .map_err(|e| PipelineError::Hitl(e.to_string()))?;
            self.audit(&claim.id, AuditEventKind::HitlOpen, serde_json::json!({"ticket_id": ticket_id}))?;
            self.checkpoint(&claim.id, |instance| {
                instance.status = PipelineStatus::AwaitingHitl { ticket_id: ticket_id.clone() };
                instance.updated_at = Utc::now();
            });

            let resolved = self
                .hitl
                .await_resolution(&ticket_id)
                .await
                .map_err(|e| PipelineError::Hitl(e.to_string()))?;
            self.audit(
                &claim.id,
                AuditEventKind::HitlResolved,
                serde_json::json!({"ticket_id": ticket_id, "status": format!("{:?}", resolved.status)}),
            )?;

            match resolved.status {
                TicketStatus::Rejected => {
                    final_verdict = "halt".to_string();
                    halt_reasons.push("hitl_rejected".to_string());
                }
                TicketStatus::Expired => {
                    final_verdict = "halt".to_string();
                    halt_reasons.push("hitl_expired".to_string());
                }
                TicketStatus::Approved | TicketStatus::Awaiting => {}
            }

            serde_json::json!({
                "opened": true,
                "ticket_id": resolved.ticket_id,
                "status": format!("{:?}", resolved.status),
                "reviewer_id": resolved.reviewer_id,
                "reason": resolved.reason,
                "auto_approved": false,
            })
        } else {
            info!(claim_id = %claim.id, "hitl bypassed: auto-approved, low risk");
            serde_json::json!({"opened": false, "reviewer_id": "auto", "auto_approved": true})
        };

        let stages = StageOutputs {
            sanitize: serde_json::to_value(&sanitize_out).unwrap(),
            embed: serde_json::to_value(&embed_out).unwrap(),
            search: serde_json::to_value(&search_out).unwrap(),
            verify: serde_json::to_value(&verify_out).unwrap(),
            detect: serde_json::json!({
                "flags": detect_out.flags,
                "trust": detect_out.trust,
                "trust_halt": detect_out.trust_halt,
                "halt_required": detect_out.halt_required,
                "hitl": hitl_payload,
            }),
        };

        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;

        let sign_inputs = sign::SignInputs {
            claim_id: claim.id.clone(),
            instance_id: instance_id.clone(),
            domain: domain_tag.clone(),
            pipeline_version: "1.0.0".to_string(),
            stages,
            final_verdict: final_verdict.clone(),
            final_confidence: verify_out.snapshot.weighted_confidence,
            trust_score: detect_out.trust,
            halt_reasons,
            duration_ms,
        };

        let record = self
            .stage_checkpoint(&claim.id, Stage::Sign, || async {
                run_with_retry(self.config.sign.retry, || async { sign::run(&self.evidence, sign_inputs.clone(), Utc::now()) })
                    .await
                    .map_err(|e| PipelineError::StageFailed { stage: Stage::Sign, reason: e.to_string() })
            })
            .await?;

        self.audit(&claim.id, AuditEventKind::ProofSigned, serde_json::json!({"proof_hash": record.bundle.proof_hash}))?;
        self.cache.set(format!("proof:{}", claim.id), serde_json::to_value(&record).unwrap(), PROOF_CACHE_TTL);
        self.checkpoint(&claim.id, |instance| {
            instance.status = PipelineStatus::Completed;
            instance.updated_at = Utc::now();
        });

        Ok(record)
    }

    /// Best-effort checkpoint write: the instance store backs the Pipeline
    /// Instance's durability (spec.md §4.2), but a write hiccup here should
    /// not abort a claim that the audit ledger has already durably recorded
    /// progress for — only logged, the same way `fail_instance` treats its
    /// own write.
    fn checkpoint(&self, claim_id: &str, mutate: impl FnOnce(&mut PipelineInstance)) {
        if let Err(e) = self.instances.update(claim_id, mutate) {
            warn!(claim_id, error = %e, "instance checkpoint write failed");
        }
    }

    /// Logs stage-start / stage-complete / stage-fail bracketing around a
    /// stage body, within its configured timeout.
    async fn stage_checkpoint<F, Fut, T>(&self, claim_id: &str, stage: Stage, body: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, PipelineError>>,
    {
        self.checkpoint(claim_id, |instance| {
            instance.advance_to(stage);
            instance.record_attempt(stage);
        });
        self.audit(claim_id, AuditEventKind::StageStart, serde_json::json!({"stage": stage.name()}))?;
        let timing = self.config.timing_for(stage);
        match tokio::time::timeout(timing.timeout, body()).await {
            Ok(Ok(output)) => {
                self.audit(claim_id, AuditEventKind::StageComplete, serde_json::json!({"stage": stage.name()}))?;
                Ok(output)
            }
            Ok(Err(e)) => {
                self.fail_instance(claim_id, stage, &e.to_string());
                self.audit(claim_id, AuditEventKind::StageFail, serde_json::json!({"stage": stage.name(), "reason": e.to_string()}))?;
                Err(e)
            }
            Err(_) => {
                let err = PipelineError::StageTimeout { stage };
                self.fail_instance(claim_id, stage, "timeout");
                self.audit(claim_id, AuditEventKind::StageFail, serde_json::json!({"stage": stage.name(), "reason": "timeout"}))?;
                Err(err)
            }
        }
    }

    fn fail_instance(&self, claim_id: &str, stage: Stage, reason: &str) {
        self.checkpoint(claim_id, |instance| {
            instance.status = PipelineStatus::Failed { stage, reason: reason.to_string() };
            instance.last_error = Some(reason.to_string());
            instance.updated_at = Utc::now();
        });
    }
}
