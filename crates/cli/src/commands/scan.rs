//! `scan`: one-shot view of funding rates across the universe.

use anyhow::Result;
use clap::Args;
use funding_arb_core::{AppConfig, FundingObservation, InstrumentQuote, Ledger, OpportunityScanner};
use funding_arb_data::SqliteLedger;
use rust_decimal::Decimal;

/// Arguments for the scan command.
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Number of most negative rates to list
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Override `strategy.funding_threshold`
    #[arg(long, allow_hyphen_values = true)]
    pub threshold: Option<Decimal>,

    /// Append the observed rates to the ledger
    #[arg(long)]
    pub record: bool,
}

/// Runs the scan command.
///
/// # Errors
/// Returns an error if the exchange cannot be queried or the ledger write fails.
pub async fn run_scan(config: AppConfig, args: ScanArgs) -> Result<()> {
    let gateway = super::build_gateway(&config)?;
    let snapshot = gateway.snapshot().await?;
    let threshold = args.threshold.unwrap_or(config.strategy.funding_threshold);
    let scanner = OpportunityScanner::new(threshold);

    let mut quotes = snapshot.value.clone();
    quotes.sort_by(|a, b| a.funding_rate.cmp(&b.funding_rate));

    println!(
        "Funding rates ({} instruments, source: {})",
        quotes.len(),
        snapshot.source.as_str()
    );
    println!(
        "{:<10} {:>14} {:>14} {:>12}",
        "SYMBOL", "FUNDING", "MARK", "APR %"
    );
    for quote in quotes.iter().take(args.top) {
        print_quote(quote, config.strategy.funding_periods_per_day);
    }

    match scanner.select_best_quote(&snapshot.value) {
        Some(best) => println!(
            "\nBest opportunity: {} at {} (threshold {threshold})",
            best.symbol, best.funding_rate
        ),
        None => println!("\nNo instrument below threshold {threshold}"),
    }

    if args.record {
        let ledger = SqliteLedger::connect(&config.ledger.url).await?;
        let observations: Vec<FundingObservation> = snapshot
            .value
            .iter()
            .map(|q| FundingObservation {
                timestamp: q.observed_at,
                instrument: q.symbol.clone(),
                funding_rate: q.funding_rate,
                source: snapshot.source,
            })
            .collect();
        ledger.record_funding_batch(&observations).await?;
        tracing::info!(count = observations.len(), "Funding observations recorded");
    }

    Ok(())
}

fn print_quote(quote: &InstrumentQuote, periods_per_day: u32) {
    let apr = quote.funding_rate
        * Decimal::from(periods_per_day)
        * Decimal::from(365)
        * Decimal::ONE_HUNDRED;
    println!(
        "{:<10} {:>14} {:>14} {:>12}",
        quote.symbol,
        quote.funding_rate.to_string(),
        quote.mark_price.to_string(),
        apr.round_dp(2).to_string()
    );
}
