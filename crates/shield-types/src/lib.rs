//! Shared domain types for the Shield verification platform.
//!
//! Every entity in `spec.md` §3 (Claim, Voting Session, Vote, Consensus
//! Snapshot, Pipeline Instance, HITL Ticket, Proof Record, Audit Event,
//! Cache Entry) lives here so the consensus, pipeline, evidence, ledger,
//! and API crates all share one vocabulary instead of re-declaring shapes
//! at every boundary.

pub mod audit;
pub mod canonical;
pub mod claim;
pub mod hitl;
pub mod pipeline;
pub mod proof;
pub mod vote;

pub use audit::{AuditEvent, AuditEventKind};
pub use canonical::{canonical_json, sha256_hex, CanonicalJson};
pub use claim::{Claim, Domain, Priority};
pub use hitl::{Decision, HitlTicket, TicketStatus};
pub use pipeline::{PipelineInstance, PipelineStatus, Stage, StageLogEntry};
pub use proof::{ProofBundle, ProofRecord, StageOutputs, GENESIS_HASH};
pub use vote::{ConsensusSnapshot, ModelId, Vote, Verdict};

use thiserror::Error;

/// Errors shared across the domain model (range/enum validation failures
/// that every crate needs to report the same way).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    /// A numeric field fell outside its documented range.
    #[error("{field} must be within {lo}..={hi}, got {value}")]
    OutOfRange {
        field: &'static str,
        lo: f64,
        hi: f64,
        value: f64,
    },

    /// A string field did not match one of its closed-set values.
    #[error("{field} has unknown value {value:?}")]
    UnknownEnumValue { field: &'static str, value: String },

    /// A weight must be strictly positive.
    #[error("weight must be > 0, got {0}")]
    NonPositiveWeight(f64),
}
