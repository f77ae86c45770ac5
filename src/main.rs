//! DeFi Position Hooks CLI
//!
//! Command-line interface for listing positions and triggering shortcuts.

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use defi_position_hooks::{
    trigger_shortcut, ChainClient, Config, Error, HookRegistry, HttpSimulator,
    HttpTokenInfoSource, NetworkId, PositionResolver, Result, RpcChainClient, RpcConfig,
    RpcSimulator, ShortcutRegistry, StaticTokenInfoSource, TokenInfoSource, TransactionBuilder,
    TransactionSimulator,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hooks")]
#[command(about = "DeFi position hooks runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List a wallet's positions
    Positions {
        /// Network (celo-mainnet, ethereum-mainnet, arbitrum-one, ...)
        #[arg(short, long)]
        network: NetworkId,

        /// Wallet address
        #[arg(short, long)]
        address: Address,
    },

    /// List available shortcuts
    Shortcuts {
        #[arg(short, long)]
        network: NetworkId,

        /// Wallet address, for apps that tailor shortcuts to a wallet
        #[arg(short, long)]
        address: Option<Address>,
    },

    /// Build the transactions of a shortcut
    Trigger {
        #[arg(short, long)]
        network: NetworkId,

        /// Wallet address
        #[arg(short, long)]
        address: Address,

        /// App id (stcelo, somm, ...)
        #[arg(long)]
        app: String,

        /// Shortcut id (deposit, withdraw, ...)
        #[arg(short, long)]
        shortcut: String,

        /// Additional trigger arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config
    let config = if let Some(config_path) = cli.config {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("{}: {}", config_path.display(), e)))?;
        serde_json::from_str::<Config>(&content).map_err(|e| Error::Config(e.to_string()))?
    } else {
        Config::default()
    }
    .with_env_overrides();

    match cli.command {
        Commands::Positions { network, address } => {
            run_positions(&config, network, address).await?;
        }
        Commands::Shortcuts { network, address } => {
            let registry = ShortcutRegistry::builtin(&config);
            print_json(&registry.list_shortcuts(network, address).await)?;
        }
        Commands::Trigger {
            network,
            address,
            app,
            shortcut,
            args,
        } => {
            run_trigger(&config, network, address, &app, &shortcut, args.as_deref()).await?;
        }
        Commands::Config => {
            print_json(&config)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn chain_client(config: &Config) -> Arc<dyn ChainClient> {
    Arc::new(RpcChainClient::new(RpcConfig::from_env(), config.call_timeout()))
}

async fn run_positions(config: &Config, network: NetworkId, address: Address) -> Result<()> {
    let chain = chain_client(config);
    let token_info: Arc<dyn TokenInfoSource> = match &config.get_tokens_info_url {
        Some(url) => Arc::new(HttpTokenInfoSource::new(
            url.clone(),
            config.token_info_ttl(),
            config.call_timeout(),
        )),
        None => {
            tracing::warn!("No token info feed configured - using well-known tokens only");
            Arc::new(StaticTokenInfoSource::well_known())
        }
    };

    let registry = Arc::new(HookRegistry::builtin(config, chain.clone()));
    tracing::info!(
        network = %network,
        address = %address,
        apps = ?registry.apps().iter().map(|app| app.id.as_str()).collect::<Vec<_>>(),
        "Fetching positions"
    );

    let resolver = PositionResolver::new(registry, chain, token_info, config.call_timeout());
    let positions = resolver.get_positions(network, address).await?;
    print_json(&positions)
}

async fn run_trigger(
    config: &Config,
    network: NetworkId,
    address: Address,
    app_id: &str,
    shortcut_id: &str,
    args: Option<&str>,
) -> Result<()> {
    let mut raw_args: Map<String, Value> = match args {
        Some(args) => match serde_json::from_str(args)? {
            Value::Object(map) => map,
            _ => {
                return Err(Error::InvalidArgument(
                    "--args must be a JSON object".to_string(),
                ))
            }
        },
        None => Map::new(),
    };
    raw_args.insert("networkId".to_string(), Value::String(network.to_string()));
    raw_args.insert("address".to_string(), Value::String(address.to_string()));

    let simulator: Arc<dyn TransactionSimulator> = match &config.simulate_transactions_url {
        Some(url) => Arc::new(HttpSimulator::new(url, config.call_timeout())?),
        None => Arc::new(RpcSimulator::new(RpcConfig::from_env(), config.call_timeout())),
    };
    let builder = TransactionBuilder::new(chain_client(config), simulator, config.call_timeout());
    let registry = ShortcutRegistry::builtin(config);

    let result = trigger_shortcut(&registry, &builder, app_id, shortcut_id, &raw_args).await?;
    print_json(&result)
}
