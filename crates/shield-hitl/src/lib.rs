//! Human-in-the-Loop Gate (spec.md §4.3).
//!
//! Suspends a Pipeline Instance awaiting an external decision and resumes it
//! deterministically on resolution or timeout. Grounded on
//! `knhk-workflow-engine::concurrency::CancelToken`'s `Notify`-backed wait
//! shape, generalized from a binary cancelled/not-cancelled flag to the
//! four-way `TicketStatus` state machine.

mod gate;
mod reaper;
mod risk;

pub use gate::{HitlError, HitlGate};
pub use reaper::ExpiryReaper;
pub use risk::{requires_review, RiskLevel};

pub type Result<T> = std::result::Result<T, HitlError>;
