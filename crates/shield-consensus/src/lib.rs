//! Shield Consensus Engine.
//!
//! Collects weighted opinions from independent verifier models for a single
//! claim, computes a Byzantine-tolerant quorum verdict, and applies the
//! Variance Halt and Constitutional Halt disciplines (spec.md §4.1).
//!
//! Grounded on `knhk-consensus`'s `ConsensusConfig`/`ConsensusError` shape
//! and its `max_byzantine_tolerance` helper, generalized from replica
//! voting to model-opinion voting.

mod algorithm;
mod session;

pub use algorithm::{compute_snapshot, HaltConfig};
pub use session::{ConsensusEngine, SessionState};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Minimum number of valid votes required to attempt a BFT quorum
/// (spec.md §6: "Minimum vote count 3").
pub const MIN_QUORUM_VOTES: usize = 3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session {0} is sealed")]
    SessionSealed(String),

    #[error("session {0} not found")]
    NotFound(String),
}
