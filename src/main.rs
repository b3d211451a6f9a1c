use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airdrop::config::{signing_key_from_env, Config};
use airdrop::distribution::{load_transfer_list, DisbursementConfig, DisbursementEngine};
use airdrop::execution::{InMemorySigner, TezosConfig, TezosRpcClient};
use airdrop::providers::{TzktProvider, TzstatsProvider};
use airdrop::reconcile::{ReconcileConfig, Reconciler};

#[derive(Parser)]
#[command(name = "airdrop", about = "Token distribution and voter/oven reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send every `address, amount` line of the input as a token transfer
    Distribute {
        #[arg(long, default_value = "airdrop.csv")]
        input: PathBuf,
        #[arg(long, default_value = "completed_airdrops.csv")]
        ledger: PathBuf,
        /// Override the operator pause before the first transfer
        #[arg(long)]
        pause_secs: Option<u64>,
    },
    /// Cross-check voters between two indexers and snapshot oven balances
    Reconcile {
        #[arg(long, default_value = "voters.csv")]
        voters: PathBuf,
        #[arg(long, default_value = "ovens.csv")]
        ovens: PathBuf,
    },
}

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,airdrop=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Command::Distribute {
            input,
            ledger,
            pause_secs,
        } => {
            // Before any other I/O: no key, no run.
            let secret = match signing_key_from_env() {
                Ok(secret) => secret,
                Err(e) => {
                    error!("Fatal: {}", e);
                    std::process::exit(1);
                }
            };
            distribute(secret, input, ledger, pause_secs).await
        }
        Command::Reconcile { voters, ovens } => reconcile(voters, ovens).await,
    }
}

async fn distribute(
    secret: String,
    input: PathBuf,
    ledger: PathBuf,
    pause_secs: Option<u64>,
) -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    let signer = InMemorySigner::from_secret_key(&secret)?;
    let source = signer.public_key_hash().to_string();
    info!("> Signing as {} ({})", source, signer.public_key());

    info!("🚀 Starting distribution");
    info!("> Parsing file: {}", input.display());
    info!("> Using node: {}", config.rpc_url);

    let intents = load_transfer_list(&input)?;
    info!("> Loaded {} transfers", intents.len());

    let mut engine_config = DisbursementConfig::from_config(&config, source, ledger)?;
    if let Some(secs) = pause_secs {
        engine_config.set_safety_pause(secs)?;
    }

    let client = TezosRpcClient::new(TezosConfig::from(&config)).with_signer(signer);
    let engine = DisbursementEngine::new(engine_config, Arc::new(client));

    let report = engine.run(&intents).await?;
    info!(
        "🏁 Distribution finished: {} of {} transfers confirmed",
        report.completed.len(),
        intents.len()
    );
    Ok(())
}

async fn reconcile(voters: PathBuf, ovens: PathBuf) -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    info!("🚀 Calculating airdrop");

    let tzkt = Arc::new(TzktProvider::from_config(&config));
    let tzstats = Arc::new(TzstatsProvider::from_config(&config));
    let chain = Arc::new(TezosRpcClient::new(TezosConfig::from(&config)));

    let reconciler = Reconciler::new(
        ReconcileConfig::from_config(&config, voters, ovens),
        tzkt.clone(),
        tzstats,
        tzkt,
        chain,
    );

    let report = reconciler.run().await?;
    info!(
        "🏁 Reconciliation finished: {} voters, {} ovens",
        report.voters.len(),
        report.ovens.len()
    );
    Ok(())
}
