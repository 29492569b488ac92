use std::sync::Arc;

use clap::Parser;
use tickwork_core::{runtime, TickworkConfig};
use tickwork_scheduler::{
    AgentFactory, AgentManager, MergedConfigurationProvider, NamedTaskResolver,
};
use tracing::{info, warn};

mod tasks;

/// tickwork - in-process agent scheduler daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Print the loaded agents as JSON and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runtime::mark_started();
    let args = Args::parse();

    // config path: --config > TICKWORK_CONFIG env > ~/.tickwork/tickwork.toml
    let config_path = args.config.or_else(|| std::env::var("TICKWORK_CONFIG").ok());
    let loaded = TickworkConfig::load(config_path.as_deref());
    let log_filter = loaded
        .as_ref()
        .map(|c| c.daemon.log_filter.clone())
        .unwrap_or_else(|_| tickwork_core::config::DEFAULT_LOG_FILTER.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .init();

    let config = loaded.unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TickworkConfig::default()
    });

    let resolver = Arc::new(NamedTaskResolver::new());
    tasks::register_builtin(&resolver);
    info!(tasks = ?resolver.names(), "tasks registered");

    let mut declared = tasks::declared_agents()?;
    declared.extend(config.agents.iter().cloned());
    let mut provider = MergedConfigurationProvider::new(declared);
    if let Some(path) = &config.daemon.descriptor {
        provider = provider.with_descriptor(path);
    }

    let manager = Arc::new(AgentManager::new(AgentFactory::new(resolver)));
    let loaded = manager.load_from(&provider)?;
    info!(agents = loaded, version = runtime::version(), "tickwork daemon initialised");

    if args.list {
        println!("{}", serde_json::to_string_pretty(&manager.agent_summaries())?);
        return Ok(());
    }

    let started = manager.start_auto_agents().await;
    info!(started, public = ?manager.public_agent_names(), "agents started; waiting for ctrl-c");

    tokio::signal::ctrl_c().await?;
    info!(uptime_secs = runtime::uptime().as_secs(), "shutdown requested");

    manager.stop_all().await;
    for name in manager.public_agent_names() {
        if let Ok(report) = manager.status_report(&name) {
            info!(agent = %name, "final status\n{report}");
        }
    }
    Ok(())
}
