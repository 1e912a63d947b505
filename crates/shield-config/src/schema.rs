//! Configuration schema: every threshold and timeout in spec.md §5/§6,
//! with the spec's own defaults.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sanitize_timeout_secs: u64,
    pub embed_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub verify_timeout_secs: u64,
    pub detect_timeout_secs: u64,
    pub sign_timeout_secs: u64,
    pub model_call_timeout_secs: u64,
    pub hitl_default_days: i64,
    pub verify_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sanitize_timeout_secs: 30,
            embed_timeout_secs: 60,
            search_timeout_secs: 30,
            verify_timeout_secs: 120,
            detect_timeout_secs: 60,
            sign_timeout_secs: 30,
            model_call_timeout_secs: 30,
            hitl_default_days: 7,
            verify_concurrency: 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub variance_ceiling: f64,
    pub min_quorum_votes: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            variance_ceiling: 0.25,
            min_quorum_votes: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub evidence_db_path: String,
    pub ledger_db_path: String,
    pub vector_index_db_path: String,
    pub instance_db_path: String,
    pub hitl_db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            evidence_db_path: "./data/evidence".to_string(),
            ledger_db_path: "./data/ledger".to_string(),
            vector_index_db_path: "./data/vector-index".to_string(),
            instance_db_path: "./data/instances".to_string(),
            hitl_db_path: "./data/hitl".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub consensus: ConsensusConfig,
    pub storage: StorageConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ShieldConfig::default();
        assert_eq!(config.pipeline.verify_timeout_secs, 120);
        assert_eq!(config.pipeline.hitl_default_days, 7);
        assert_eq!(config.consensus.variance_ceiling, 0.25);
        assert_eq!(config.consensus.min_quorum_votes, 3);
    }
}
