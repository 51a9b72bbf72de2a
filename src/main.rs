use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use retrieval_stats::clock::SystemClock;
use retrieval_stats::config::{Config, ConfigOverrides};
use retrieval_stats::ledger::client::RpcLedger;
use retrieval_stats::observer::run_observer_loop;
use retrieval_stats::server::run_server;
use retrieval_stats::store::StatsStore;

#[derive(Debug, Parser)]
#[command(
    name = "retrieval-stats",
    about = "Usage and reward statistics for a decentralized retrieval network"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    rpc: Option<String>,
    #[arg(long)]
    db: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Observe {
        #[arg(long)]
        interval_secs: Option<u64>,
        #[arg(long, default_value_t = 1)]
        iterations: u32,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        rpc_url: cli.rpc.clone(),
        db_path: cli.db.clone(),
    });

    match &cli.command {
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr, Arc::new(SystemClock)).await
        }
        Commands::Observe {
            interval_secs,
            iterations,
        } => {
            let store = StatsStore::open(&config.resolved_db_path())?;
            let ledger = RpcLedger::new(&config.ledger);
            let interval = Duration::from_secs(
                interval_secs
                    .unwrap_or(config.observer.interval_secs)
                    .max(1),
            );
            run_observer_loop(&store, &ledger, &SystemClock, interval, *iterations).await
        }
        Commands::Config { init, show } => handle_config_command(*init, *show, &config, &config_path),
    }
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", serde_json::to_string_pretty(config)?);
    }
    Ok(())
}
