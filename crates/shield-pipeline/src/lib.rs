//! Durable Verification Pipeline orchestrator: sanitize -> embed -> search
//! -> verify -> detect -> sign, with per-stage retry/timeout, HITL
//! suspension, and an idempotent Sign stage.

pub mod config;
pub mod deps;
pub mod instance_store;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod stages;

pub use config::{OrchestratorConfig, StageTiming};
pub use deps::{cosine_similarity, embed_text, HeuristicModelGateway, ModelGateway, ModelGatewayError, SimilarClaim, SledVectorIndex, VectorIndex, VectorIndexError, VectorKind};
pub use instance_store::{InstanceStore, InstanceStoreError};
pub use models::{default_registry, ModelProfile, DEFAULT_MODELS};
pub use orchestrator::{PipelineError, PipelineOrchestrator};
pub use retry::{run_with_retry, Backoff, RetryPolicy, Retryable};
