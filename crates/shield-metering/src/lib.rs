//! Account tiers, quota enforcement, and the fleet health prober
//! (spec.md §6 402/403 responses; [SUPPLEMENT] `AccountTier` entity).
//!
//! Grounded on `knhk-sidecar::health::HealthChecker`'s component-registry
//! and worst-of aggregation shape for the probe, and on the same crate's
//! error-enum style for `MeteringError`.

mod account;
mod health;

pub use account::{AccountRegistry, AccountTier, MeteringError};
pub use health::{ComponentHealth, FleetHealth, HealthStatus};
