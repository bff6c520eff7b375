use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sentinel::notifier::{Sender, TelegramService};
use sentinel::registry::Registry;
use sentinel::scheduler::Monitor;
use sentinel::store::Store;

const EXIT_ERROR: i32 = 1;
const EXIT_INTERRUPT: i32 = 2;

/// Tendermint validator monitoring and alerting daemon.
///
/// Watches the signing health of subscribed validators through a chain RPC
/// endpoint and pushes alerts to users over Telegram: jailing, tombstoning,
/// missed blocks, slashing-window SLA breaches, and RPC health.
#[derive(Debug, Parser)]
#[command(name = "sentinel", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the monitoring daemon.
    Monitor {
        /// Path to the YAML configuration file.
        #[arg(short = 'f', long = "file", default_value = "./config.yaml")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Monitor { file } => run_monitor(&file).await,
    };
    if let Err(error) = result {
        tracing::error!("{error:#}");
        std::process::exit(EXIT_ERROR);
    }
}

fn load_config(path: &Path) -> anyhow::Result<models::Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

async fn run_monitor(file: &Path) -> anyhow::Result<()> {
    let config = load_config(file)?;

    let store = Store::open(&config.db_path)?;
    let registry = Arc::new(Registry::new(Box::new(store), config.clone()));
    registry
        .load_subscriptions()
        .context("loading persisted subscriptions")?;

    let sender = match &config.notifications.telegram {
        Some(telegram) => Sender::Telegram(
            TelegramService::new(config.clone(), telegram).context("initializing telegram bot")?,
        ),
        None => {
            tracing::warn!("no telegram configuration, alert delivery is disabled");
            Sender::Disabled
        }
    };
    let sender = Arc::new(sender);
    if let Sender::Telegram(service) = sender.as_ref() {
        service.set_monitor_manager(registry.clone());
    }

    let client = chain_client::Client::new(
        &config.validators_monitor.rpc,
        &config.validators_monitor.chain_id,
    )
    .context("initializing chain client")?;

    // First signal finishes the current tick and stops; a second one forces
    // the process down.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, stopping after the current tick");
            let _ = shutdown_tx.send(true);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second shutdown signal, exiting immediately");
            std::process::exit(EXIT_INTERRUPT);
        }
    });

    let command_loop = match sender.as_ref() {
        Sender::Telegram(_) => {
            let sender = sender.clone();
            let shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                let Sender::Telegram(service) = sender.as_ref() else {
                    return;
                };
                if let Err(error) = service.serve_updates(shutdown).await {
                    tracing::error!(%error, "telegram command loop terminated");
                }
            }))
        }
        Sender::Disabled => None,
    };

    let monitor = Monitor::new(registry, client, sender, config);
    monitor.run(shutdown_rx).await?;

    if let Some(command_loop) = command_loop {
        let _ = command_loop.await;
    }
    Ok(())
}
