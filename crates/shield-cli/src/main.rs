//! Operator entry point: `serve` boots the full platform (pipeline,
//! metering, API) on one process; `submit`/`status`/`approve`/`reject`/
//! `proof`/`audit`/`health` are thin HTTP clients against a running server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use shield_config::ShieldConfig;
use shield_consensus::ConsensusEngine;
use shield_evidence::EvidenceStore;
use shield_hitl::{ExpiryReaper, HitlGate};
use shield_ledger::{AuditLedger, Cache};
use shield_metering::{AccountRegistry, AccountTier, FleetHealth, HealthStatus};
use shield_pipeline::{default_registry, HeuristicModelGateway, InstanceStore, OrchestratorConfig, PipelineOrchestrator, SledVectorIndex, StageTiming};
use shield_types::Stage;

#[derive(Parser)]
#[command(name = "shield", version, about = "Shield verification platform server and client")]
struct Cli {
    /// Path to a TOML config file (defaults per spec.md apply otherwise).
    #[arg(long, global = true, env = "SHIELD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Boot the API server with an in-process pipeline, consensus engine,
    /// evidence store, audit ledger, and HITL gate.
    Serve {
        /// Register an account at boot, "account_id:tier" (tier is one of
        /// free/pro/enterprise). Repeatable.
        #[arg(long = "seed-account")]
        seed_accounts: Vec<String>,
    },
    /// Submit a claim to a running server.
    Submit {
        #[arg(long)]
        id: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        evidence: Vec<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long, default_value = "normal")]
        priority: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        addr: String,
        #[arg(long, env = "SHIELD_API_KEY")]
        api_key: String,
    },
    /// Poll a claim's pipeline status.
    Status {
        id: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        addr: String,
        #[arg(long, env = "SHIELD_API_KEY")]
        api_key: String,
    },
    /// Fetch a claim's signed proof bundle.
    Proof {
        id: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        addr: String,
        #[arg(long, env = "SHIELD_API_KEY")]
        api_key: String,
    },
    /// Fetch a claim's audit trail.
    Audit {
        id: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        addr: String,
        #[arg(long, env = "SHIELD_API_KEY")]
        api_key: String,
    },
    /// Approve a claim currently awaiting HITL review.
    Approve {
        id: String,
        #[arg(long, default_value = "")]
        reason: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        addr: String,
        #[arg(long, env = "SHIELD_REVIEWER_KEY")]
        reviewer_key: String,
    },
    /// Reject a claim currently awaiting HITL review.
    Reject {
        id: String,
        #[arg(long, default_value = "")]
        reason: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        addr: String,
        #[arg(long, env = "SHIELD_REVIEWER_KEY")]
        reviewer_key: String,
    },
    /// Check a running server's `/health`.
    Health {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        addr: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { seed_accounts } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(cli.config.as_deref(), seed_accounts))
        }
        Command::Submit { id, text, evidence, domain, priority, addr, api_key } => {
            submit(&addr, &api_key, id, text, evidence, domain, priority)
        }
        Command::Status { id, addr, api_key } => get(&addr, &id, "x-api-key", &api_key),
        Command::Proof { id, addr, api_key } => get(&addr, &format!("{id}/proof"), "x-api-key", &api_key),
        Command::Audit { id, addr, api_key } => get(&addr, &format!("{id}/audit"), "x-api-key", &api_key),
        Command::Approve { id, reason, addr, reviewer_key } => decide(&addr, &reviewer_key, &id, "approve", reason),
        Command::Reject { id, reason, addr, reviewer_key } => decide(&addr, &reviewer_key, &id, "reject", reason),
        Command::Health { addr } => health(&addr),
    }
}

async fn serve(config_path: Option<&std::path::Path>, seed_accounts: Vec<String>) -> anyhow::Result<()> {
    let config: ShieldConfig = shield_config::load_config(config_path)?;

    let consensus = ConsensusEngine::new();
    let evidence = Arc::new(EvidenceStore::open(&config.storage.evidence_db_path)?);
    let ledger = Arc::new(AuditLedger::open(&config.storage.ledger_db_path)?);
    let vector_index = Arc::new(SledVectorIndex::open(&config.storage.vector_index_db_path)?);
    let instances = Arc::new(InstanceStore::open(&config.storage.instance_db_path)?);
    let cache = Cache::new();
    let hitl = HitlGate::open(&config.storage.hitl_db_path)?;

    ExpiryReaper::new(hitl.clone(), Duration::from_secs(60)).spawn();

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        consensus,
        evidence,
        ledger,
        cache,
        hitl,
        vector_index,
        Arc::new(HeuristicModelGateway),
        default_registry(),
        orchestrator_config_from(&config),
        instances,
    ));

    let accounts = Arc::new(AccountRegistry::new());
    for spec in &seed_accounts {
        let (account_id, tier) = parse_seed_account(spec)?;
        accounts.register(account_id, tier);
    }

    let fleet = Arc::new(FleetHealth::new());
    fleet.report("model-gateway", HealthStatus::Healthy, "heuristic gateway always available");
    fleet.report("vector-index", HealthStatus::Healthy, "sled db opened");
    fleet.report("evidence-store", HealthStatus::Healthy, "sled db opened");
    fleet.report("audit-ledger", HealthStatus::Healthy, "sled db opened");

    let state = shield_api::AppState::new(orchestrator, accounts, fleet);
    let router = shield_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(addr = %config.server.bind_addr, "shield api listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Overlays `shield-config`'s timeout-only `PipelineConfig` onto
/// `OrchestratorConfig::default()`'s retry/timeout pairs — the config
/// schema has no retry/backoff fields, so those stay at the orchestrator's
/// own defaults (spec.md §4.2's retry table).
fn orchestrator_config_from(config: &ShieldConfig) -> OrchestratorConfig {
    let defaults = OrchestratorConfig::default();
    let retime = |timing: StageTiming, secs: u64| StageTiming {
        retry: timing.retry,
        timeout: Duration::from_secs(secs),
    };
    OrchestratorConfig {
        verify_concurrency: config.pipeline.verify_concurrency,
        model_call_timeout: Duration::from_secs(config.pipeline.model_call_timeout_secs),
        hitl_default: Duration::from_secs((config.pipeline.hitl_default_days.max(0) as u64) * 24 * 3600),
        variance_ceiling: config.consensus.variance_ceiling,
        sanitize: retime(defaults.timing_for(Stage::Sanitize), config.pipeline.sanitize_timeout_secs),
        embed: retime(defaults.timing_for(Stage::Embed), config.pipeline.embed_timeout_secs),
        search: retime(defaults.timing_for(Stage::Search), config.pipeline.search_timeout_secs),
        verify: retime(defaults.timing_for(Stage::Verify), config.pipeline.verify_timeout_secs),
        detect: retime(defaults.timing_for(Stage::Detect), config.pipeline.detect_timeout_secs),
        sign: retime(defaults.timing_for(Stage::Sign), config.pipeline.sign_timeout_secs),
    }
}

fn parse_seed_account(spec: &str) -> anyhow::Result<(&str, AccountTier)> {
    let (id, tier) = spec
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("--seed-account must be \"account_id:tier\", got {spec:?}"))?;
    let tier = match tier.to_ascii_lowercase().as_str() {
        "free" => AccountTier::Free,
        "pro" => AccountTier::Pro,
        "enterprise" => AccountTier::Enterprise,
        other => anyhow::bail!("unknown account tier {other:?}, expected free/pro/enterprise"),
    };
    Ok((id, tier))
}

fn submit(addr: &str, api_key: &str, id: String, text: String, evidence: Vec<String>, domain: Option<String>, priority: String) -> anyhow::Result<()> {
    let body = serde_json::json!({
        "id": id,
        "text": text,
        "evidence": evidence,
        "domain": domain,
        "priority": priority,
    });
    let client = reqwest::blocking::Client::new();
    let response = client.post(format!("{addr}/v1/claims")).header("x-api-key", api_key).json(&body).send()?;
    print_response(response)
}

fn get(addr: &str, suffix: &str, header: &str, key: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::new();
    let response = client.get(format!("{addr}/v1/claims/{suffix}")).header(header, key).send()?;
    print_response(response)
}

fn decide(addr: &str, reviewer_key: &str, id: &str, verb: &str, reason: String) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::new();
    let response = client
        .post(format!("{addr}/v1/claims/{id}/{verb}"))
        .header("x-reviewer-key", reviewer_key)
        .json(&serde_json::json!({ "reason": reason }))
        .send()?;
    print_response(response)
}

fn health(addr: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::new();
    let response = client.get(format!("{addr}/health")).send()?;
    print_response(response)
}

fn print_response(response: reqwest::blocking::Response) -> anyhow::Result<()> {
    let status = response.status();
    let body: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);
    println!("{status}\n{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        anyhow::bail!("request failed with status {status}");
    }
    Ok(())
}
