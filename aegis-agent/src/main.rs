mod collectors;
mod config;
mod credentials;
mod forwarder;
mod identity;
mod models;
mod rules;
mod spool;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Mutex;

use collectors::{log::LogCollector, Collector};
use collectors::command::CommandCollector;
use collectors::metrics::MetricsCollector;
use collectors::process::ProcessCollector;
use config::Settings;
use credentials::Credentials;
use forwarder::Forwarder;
use rules::RuleEngine;
use spool::Spool;

#[derive(Parser, Debug)]
#[command(name = "aegis-agent", about = "Aegis SIEM host agent")]
struct Cli {
    #[arg(short, long, default_value = "agent.toml")]
    config: PathBuf,
}

async fn register(settings: &Settings, agent_id: uuid::Uuid) -> anyhow::Result<()> {
    if credentials::is_registered(&settings.base_dir, &agent_id.to_string()) {
        return Ok(());
    }

    let token = settings
        .invitation_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("agent is not registered and no invitation_token is configured"))?;

    use sysinfo::SystemExt;
    let hostname = sysinfo::System::new().host_name().unwrap_or_else(|| "unknown".to_string());
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/device/register", settings.server_url.trim_end_matches('/')))
        .json(&serde_json::json!({
            "token": token,
            "agent_id": agent_id,
            "hostname": hostname,
            "name": hostname,
        }))
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("registration rejected: {}", resp.status());
    }

    let creds = Credentials { server_url: settings.server_url.clone(), agent_id: agent_id.to_string(), registered: true };
    credentials::store_credentials(&settings.base_dir, &agent_id.to_string(), &creds)?;
    log::info!("registered as agent {agent_id}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).unwrap_or_else(|e| {
        log::error!("{e}");
        std::process::exit(1);
    });

    let agent_id = identity::get_agent_id(&settings.base_dir)?;
    register(&settings, agent_id).await?;

    let spool = Arc::new(Spool::open(&settings.spool_path())?);
    let rules = Arc::new(Mutex::new(RuleEngine::new()));
    let shutdown = collectors::shutdown_flag();

    let forwarder = Forwarder::new(
        settings.server_url.clone(),
        agent_id,
        spool.clone(),
        Duration::from_secs(settings.forward_interval_secs),
        settings.batch_size,
    );
    let last_sync = forwarder.fetch_last_command_sync().await;

    let mut metrics =
        MetricsCollector::new(spool.clone(), rules.clone(), Duration::from_secs(settings.metrics_interval_secs));
    let mut processes = ProcessCollector::new(spool.clone(), Duration::from_secs(settings.process_interval_secs));
    let mut commands = CommandCollector::new(spool.clone(), rules.clone(), last_sync);
    let mut logs = LogCollector::new(spool.clone(), rules.clone());

    let metrics_shutdown = shutdown.clone();
    let processes_shutdown = shutdown.clone();
    let commands_shutdown = shutdown.clone();
    let logs_shutdown = shutdown.clone();
    let forwarder_shutdown = shutdown.clone();

    let handles = vec![
        tokio::spawn(async move { metrics.start(metrics_shutdown).await }),
        tokio::spawn(async move { processes.start(processes_shutdown).await }),
        tokio::spawn(async move { commands.start(commands_shutdown).await }),
        tokio::spawn(async move { logs.start(logs_shutdown).await }),
        tokio::spawn(async move { forwarder.run(forwarder_shutdown).await }),
    ];

    log::info!("aegis-agent {agent_id} started, forwarding to {}", settings.server_url);

    tokio::signal::ctrl_c().await?;
    log::info!("shutdown requested, draining in-flight work");
    shutdown.store(true, Ordering::Relaxed);

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
