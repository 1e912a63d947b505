//! Verifier model registry (spec.md §3 [SUPPLEMENT]: dropped from the
//! distilled data model, carried here as a small static table consumed by
//! the Verify stage).

use shield_types::Domain;

/// A verifier model's identity, default vote weight, and the domains it
/// specializes in. The Verify stage asks every registered model for an
/// opinion regardless of specialty — specialty only informs operator
/// tooling and is not a filter, matching spec.md's "for each configured
/// verifier model" (no domain-scoped subsetting named).
#[derive(Clone, Debug)]
pub struct ModelProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub default_weight: f64,
    pub specialties: &'static [Domain],
}

pub const DEFAULT_MODELS: &[ModelProfile] = &[
    ModelProfile {
        id: "m1",
        display_name: "verifier-alpha",
        default_weight: 1.0,
        specialties: &[Domain::Vetproof, Domain::Legal],
    },
    ModelProfile {
        id: "m2",
        display_name: "verifier-beta",
        default_weight: 1.2,
        specialties: &[Domain::Health, Domain::Aviation],
    },
    ModelProfile {
        id: "m3",
        display_name: "verifier-gamma",
        default_weight: 1.0,
        specialties: &[Domain::Finance, Domain::Education],
    },
];

pub fn default_registry() -> Vec<ModelProfile> {
    DEFAULT_MODELS.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_meets_the_minimum_quorum_size() {
        assert!(default_registry().len() >= shield_consensus::MIN_QUORUM_VOTES);
    }
}
