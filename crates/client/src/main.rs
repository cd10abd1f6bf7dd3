use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stake_client::{create_example_config, ClientConfig, MockChain, StakingEngine};
use stake_types::{Address, TokenAmount};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stake-client")]
#[command(about = "Staking distribution client")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "stake-client.toml")]
    config: String,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an example configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run an approve, stake and claim session against an in-memory chain
    Demo {
        /// Amount to stake, in whole-token decimal form
        #[arg(long, default_value = "10")]
        amount: String,

        /// Reward polling ticks to observe before exiting
        #[arg(long, default_value = "2")]
        ticks: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.json_logs);

    match cli.command {
        Command::InitConfig { force } => init_config(&cli.config, force),
        Command::Demo { amount, ticks } => {
            let config = load_config(&cli.config)?;
            run_demo(config, &amount, ticks).await
        }
    }
}

fn init_logging(log_level: Option<&str>, json: bool) {
    let level = log_level.unwrap_or("info");
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("stake_client={},stake_types={}", level, level).into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn load_config(path: &str) -> Result<ClientConfig> {
    if Path::new(path).exists() {
        let config = ClientConfig::load(path)?;
        info!("Loaded configuration from {}", path);
        Ok(config)
    } else {
        warn!("Config file not found, using defaults: {}", path);
        Ok(ClientConfig::default())
    }
}

fn init_config(path: &str, force: bool) -> Result<()> {
    if Path::new(path).exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path);
    }
    create_example_config(path)?;
    info!("Wrote example configuration to {}", path);
    Ok(())
}

async fn run_demo(config: ClientConfig, amount: &str, ticks: u32) -> Result<()> {
    let user: Address = "0x0000000000000000000000000000000000000aaa".parse()?;
    let primary = config.primary_pool();
    let poll_interval = Duration::from_millis(config.reward_poll_interval_ms);

    let chain = Arc::new(
        MockChain::new(vec![user])
            .with_pool(primary.index(), true)
            .with_pool(primary.index() + 1, false),
    );
    chain.set_current_reward(user, primary, TokenAmount::from_whole_tokens(3));

    let engine = StakingEngine::from_config(config, chain.clone())?;

    let address = engine.connect_wallet().await?;
    info!("Connected as {}", address);
    engine.approval_reconciled().await;
    print_snapshot("connected", &engine)?;

    let approval = engine.check_approval().await?;
    info!("Approved before request: {}", approval.is_approved);

    engine.request_approval().await?;
    print_snapshot("approved", &engine)?;

    let discovered = engine.discover_pools().await?;
    info!("Discovered public pools: {:?}", discovered.pool_ids());

    let outcome = engine
        .stake(primary, amount)
        .await
        .with_context(|| format!("staking {} into pool {}", amount, primary))?;
    info!("Stake confirmed: {}", outcome.tx_hash);
    print_snapshot("staked", &engine)?;

    for _ in 0..ticks {
        tokio::time::sleep(poll_interval).await;
        if let Some(reward) = engine.snapshot().current_reward {
            info!("Current reward in pool {}: {}", reward.pool_id, reward.amount.to_decimal_string());
        }
    }

    engine.claim(primary).await?;
    print_snapshot("claimed", &engine)?;

    engine.disconnect().await;
    Ok(())
}

fn print_snapshot(label: &str, engine: &StakingEngine) -> Result<()> {
    let snapshot = serde_json::to_string_pretty(&engine.snapshot())?;
    println!("== {} ==\n{}", label, snapshot);
    Ok(())
}
