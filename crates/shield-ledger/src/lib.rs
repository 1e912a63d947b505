//! Cache + Audit Ledger interfaces (spec.md §4.5).
//!
//! Two unrelated concerns share this crate because they're both
//! dependency-order leaves sitting right next to the Evidence Store: a
//! best-effort short-TTL `Cache` (grounded on
//! `knhk-workflow-engine::cache::ReflexCache`'s `DashMap` shape, with the
//! expiry check from `knhk-test-cache::cache`) and a durability-aware
//! append-only `AuditLedger` (grounded on `knhk-lockchain::storage`'s sled
//! usage, generalized from hash-chained entries to a plain sequential log).

mod audit;
mod cache;

pub use audit::{AuditLedger, LedgerError};
pub use cache::Cache;
