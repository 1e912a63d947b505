//! Layered configuration: defaults, TOML file, `SHIELD_*` environment
//! overrides (spec.md §6 "All timeouts and thresholds are overridable by
//! config with the above as defaults").
//!
//! Grounded on `knhk-config::config::load_config`'s env > file > defaults
//! hierarchy and `apply_env_overrides`'s per-variable match arm shape.

mod schema;

pub use schema::{ConsensusConfig, PipelineConfig, ServerConfig, ShieldConfig, StorageConfig};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("io error: {0}")]
    IoError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Load configuration: defaults, overlaid by `path` if it exists, overlaid
/// by `SHIELD_*` environment variables, then validated.
pub fn load_config(path: Option<&Path>) -> Result<ShieldConfig, ConfigError> {
    let mut config = match path {
        Some(p) if p.exists() => load_from_file(p)?,
        _ => ShieldConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_from_file(path: &Path) -> Result<ShieldConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Apply `SHIELD_*` overrides on top of whatever was loaded from file.
pub fn apply_env_overrides(config: &mut ShieldConfig) -> Result<(), ConfigError> {
    use std::env;

    if let Ok(v) = env::var("SHIELD_SERVER_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Ok(v) = env::var("SHIELD_PIPELINE_VERIFY_CONCURRENCY") {
        config.pipeline.verify_concurrency = parse_env("SHIELD_PIPELINE_VERIFY_CONCURRENCY", &v)?;
    }
    if let Ok(v) = env::var("SHIELD_PIPELINE_HITL_DEFAULT_DAYS") {
        config.pipeline.hitl_default_days = parse_env("SHIELD_PIPELINE_HITL_DEFAULT_DAYS", &v)?;
    }
    if let Ok(v) = env::var("SHIELD_PIPELINE_MODEL_CALL_TIMEOUT_SECS") {
        config.pipeline.model_call_timeout_secs = parse_env("SHIELD_PIPELINE_MODEL_CALL_TIMEOUT_SECS", &v)?;
    }
    if let Ok(v) = env::var("SHIELD_CONSENSUS_VARIANCE_CEILING") {
        config.consensus.variance_ceiling = parse_env("SHIELD_CONSENSUS_VARIANCE_CEILING", &v)?;
    }
    if let Ok(v) = env::var("SHIELD_CONSENSUS_MIN_QUORUM_VOTES") {
        config.consensus.min_quorum_votes = parse_env("SHIELD_CONSENSUS_MIN_QUORUM_VOTES", &v)?;
    }
    if let Ok(v) = env::var("SHIELD_STORAGE_EVIDENCE_DB_PATH") {
        config.storage.evidence_db_path = v;
    }
    if let Ok(v) = env::var("SHIELD_STORAGE_LEDGER_DB_PATH") {
        config.storage.ledger_db_path = v;
    }
    if let Ok(v) = env::var("SHIELD_STORAGE_VECTOR_INDEX_DB_PATH") {
        config.storage.vector_index_db_path = v;
    }
    if let Ok(v) = env::var("SHIELD_STORAGE_INSTANCE_DB_PATH") {
        config.storage.instance_db_path = v;
    }
    if let Ok(v) = env::var("SHIELD_STORAGE_HITL_DB_PATH") {
        config.storage.hitl_db_path = v;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("invalid value for {name}: {value:?}")))
}

pub fn validate_config(config: &ShieldConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.consensus.variance_ceiling) {
        return Err(ConfigError::ValidationError(format!(
            "consensus.variance_ceiling must be within 0.0..=1.0, got {}",
            config.consensus.variance_ceiling
        )));
    }
    if config.consensus.min_quorum_votes == 0 {
        return Err(ConfigError::ValidationError("consensus.min_quorum_votes must be > 0".to_string()));
    }
    if config.pipeline.verify_concurrency == 0 {
        return Err(ConfigError::ValidationError("pipeline.verify_concurrency must be > 0".to_string()));
    }
    if config.server.bind_addr.is_empty() {
        return Err(ConfigError::ValidationError("server.bind_addr must not be empty".to_string()));
    }
    Ok(())
}
