//! Autonomy daemon: runs the engine until Ctrl+C.

use autonomy::services::{
    FactStore, InMemoryFactStore, JsonlFactStore, OllamaReasoner, TracingSink,
};
use autonomy::tasks::{HttpProbe, TASK_MONITOR_NETWORK};
use autonomy::{AutonomyConfig, AutonomyEngine, ShutdownReport};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Self-tuning background task engine.
#[derive(Parser)]
#[command(name = "autonomyd", version, about)]
struct Cli {
    /// Path to TOML configuration file. Defaults to
    /// `~/.config/autonomy/config.toml` when that file exists.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,

    /// Seconds between status log lines.
    #[arg(long, default_value_t = 60)]
    status_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autonomy=info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", toml::to_string_pretty(&AutonomyConfig::default())?);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let engine = build_engine(config)?;

    engine.start().await;
    let status_every = Duration::from_secs(cli.status_interval_secs.max(1));
    let mut status_tick = tokio::time::interval(status_every);
    status_tick.tick().await;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
            _ = status_tick.tick() => {
                info!("{}", engine.status().summary_line());
            }
        }
    }

    info!("shutdown requested");
    match engine.stop().await {
        ShutdownReport::Incomplete { outstanding } => {
            anyhow::bail!("{outstanding} background tasks still running after shutdown")
        }
        report => info!(?report, "bye"),
    }
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AutonomyConfig> {
    if let Some(path) = path {
        info!(path = %path.display(), "loading config");
        return Ok(AutonomyConfig::from_file(path)?);
    }
    let default_path = AutonomyConfig::default_config_path();
    if default_path.exists() {
        info!(path = %default_path.display(), "loading config");
        Ok(AutonomyConfig::from_file(&default_path)?)
    } else {
        info!("no config file, using defaults");
        Ok(AutonomyConfig::default())
    }
}

fn build_engine(config: AutonomyConfig) -> anyhow::Result<AutonomyEngine> {
    let reasoner = Arc::new(OllamaReasoner::new(&config.reasoner));
    let facts: Arc<dyn FactStore> = match &config.facts.path {
        Some(path) => Arc::new(JsonlFactStore::new(path.clone())),
        None => Arc::new(InMemoryFactStore::new()),
    };
    let monitor_url = config.tasks.monitor_url.clone();
    let probe_timeout = config.tasks.call_timeout();

    let mut engine =
        AutonomyEngine::new(config, reasoner, facts, Arc::new(TracingSink))?.with_builtin_tasks()?;
    if let Some(url) = monitor_url {
        info!(%url, "network monitoring enabled");
        let probe = Arc::new(HttpProbe::new("network", url, probe_timeout));
        engine = engine.with_probe(TASK_MONITOR_NETWORK, probe, Duration::from_secs(300), 4)?;
    }
    Ok(engine)
}
