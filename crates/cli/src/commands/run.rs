//! `run`: drives the position engine until interrupted.

use anyhow::{bail, Result};
use clap::Args;
use funding_arb_core::{AppConfig, EngineState, ExecutionMode, PositionEngine, TradingVenue};
use funding_arb_data::SqliteLedger;
use funding_arb_hyperliquid::{load_signer, LiveVenue, PaperVenue};
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Force paper trading regardless of `execution.mode`
    #[arg(long)]
    pub paper: bool,

    /// Let the engine act on synthetic market data (paper mode only)
    #[arg(long)]
    pub allow_synthetic: bool,
}

/// Runs the engine loop.
///
/// # Errors
/// Returns an error if the wallet, ledger or engine cannot be initialised.
pub async fn run_engine(mut config: AppConfig, args: RunArgs) -> Result<()> {
    if args.paper {
        config.execution.mode = ExecutionMode::Paper;
    }
    let allow_synthetic = args.allow_synthetic || config.execution.allow_synthetic_data;
    if allow_synthetic && config.execution.mode == ExecutionMode::Live {
        bail!("Synthetic market data cannot drive live orders; use --paper");
    }

    let gateway = super::build_gateway(&config)?;

    let venue: Arc<dyn TradingVenue> = match config.execution.mode {
        ExecutionMode::Live => {
            let signer = load_signer(&config.wallet)?;
            tracing::warn!(address = %signer.address(), "LIVE mode: orders will be signed and sent");
            Arc::new(LiveVenue::new(gateway.clone(), Arc::new(signer)))
        }
        ExecutionMode::Paper => {
            tracing::info!(
                balance = %config.execution.paper_balance,
                "Paper mode: fills are simulated against quoted prices"
            );
            Arc::new(
                PaperVenue::new(
                    gateway.clone(),
                    config.execution.paper_balance,
                    config.strategy.leverage,
                )
                .with_synthetic_data(allow_synthetic),
            )
        }
    };

    let ledger = SqliteLedger::connect(&config.ledger.url).await?;

    let mut engine = PositionEngine::new(
        gateway,
        venue,
        ledger,
        config.strategy.clone(),
        allow_synthetic,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, stopping after the current tick"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
        }
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await;

    let realized = engine.ledger().realized_profit().await?;
    let still_open = matches!(engine.state(), EngineState::Open(_));
    tracing::info!(realized_profit = %realized, still_open, "Engine stopped");

    Ok(())
}
