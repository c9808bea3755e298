use clap::{Parser, Subcommand};

mod commands;

use commands::{RunArgs, ScanArgs, WalletCheckArgs, WalletSetupArgs};

#[derive(Parser)]
#[command(name = "funding-arb")]
#[command(about = "Funding-rate arbitrage around Hyperliquid settlements", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the position engine until Ctrl+C
    Run(RunArgs),
    /// Show current funding rates and the best opportunity
    Scan(ScanArgs),
    /// Encrypt a private key into a wallet file
    WalletSetup(WalletSetupArgs),
    /// Load the wallet file and verify it
    WalletCheck(WalletCheckArgs),
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }

    let config = funding_arb_core::ConfigLoader::load_from(&cli.config)?;
    tracing::debug!(path = %cli.config, "Configuration loaded");

    match cli.command {
        Commands::Run(args) => commands::run_engine(config, args).await?,
        Commands::Scan(args) => commands::run_scan(config, args).await?,
        Commands::WalletSetup(args) => commands::run_wallet_setup(&config, &args)?,
        Commands::WalletCheck(args) => commands::run_wallet_check(&config, args).await?,
    }

    Ok(())
}
