//! Evidence Store & Proof Chain.
//!
//! Append-only key-value store addressed by `{domain}/{instance-id}/{proof-id}`
//! with per-domain, CAS-linked chain tips (spec.md §4.4). Grounded directly
//! on `knhk-lockchain::storage::LockchainStorage`'s sled-backed tip record
//! and compare-and-swap retry shape.

mod store;

pub use store::{EvidenceStore, StoreError, GENESIS_HASH};

pub type Result<T> = std::result::Result<T, StoreError>;
