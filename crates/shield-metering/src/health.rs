//! Fleet health prober (spec.md [AMBIENT] `GET /health`). Grounded on
//! `knhk-sidecar::health::HealthChecker`'s component registry and
//! worst-of-components aggregation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub last_check: DateTime<Utc>,
}

/// Aggregates liveness of the model gateway, evidence store, and vector
/// index. `overall()` is the worst status among registered components —
/// any single unhealthy dependency makes the fleet unhealthy.
#[derive(Clone, Default)]
pub struct FleetHealth {
    components: Arc<DashMap<String, ComponentHealth>>,
}

impl FleetHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, name: impl Into<String>, status: HealthStatus, message: impl Into<String>) {
        let name = name.into();
        self.components.insert(
            name.clone(),
            ComponentHealth {
                name,
                status,
                message: message.into(),
                last_check: Utc::now(),
            },
        );
    }

    pub fn overall(&self) -> HealthStatus {
        let mut worst = HealthStatus::Healthy;
        for component in self.components.iter() {
            match component.status {
                HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
                HealthStatus::Degraded => worst = HealthStatus::Degraded,
                HealthStatus::Healthy => {}
            }
        }
        worst
    }

    pub fn snapshot(&self) -> Vec<ComponentHealth> {
        self.components.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_components_reported_is_healthy() {
        let fleet = FleetHealth::new();
        assert_eq!(fleet.overall(), HealthStatus::Healthy);
    }

    #[test]
    fn one_unhealthy_component_makes_the_fleet_unhealthy() {
        let fleet = FleetHealth::new();
        fleet.report("model-gateway", HealthStatus::Healthy, "ok");
        fleet.report("evidence-store", HealthStatus::Unhealthy, "sled open failed");
        assert_eq!(fleet.overall(), HealthStatus::Unhealthy);
    }

    #[test]
    fn degraded_without_unhealthy_is_degraded() {
        let fleet = FleetHealth::new();
        fleet.report("model-gateway", HealthStatus::Healthy, "ok");
        fleet.report("vector-index", HealthStatus::Degraded, "slow responses");
        assert_eq!(fleet.overall(), HealthStatus::Degraded);
    }

    #[test]
    fn snapshot_reflects_latest_report_per_component() {
        let fleet = FleetHealth::new();
        fleet.report("model-gateway", HealthStatus::Healthy, "ok");
        fleet.report("model-gateway", HealthStatus::Degraded, "slow");
        let snapshot = fleet.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, HealthStatus::Degraded);
    }
}
