//! Single-slot position engine driven by settlement windows.
//!
//! The engine holds at most one position. In the pre-settlement window an idle engine scans the
//! funding snapshot and opens the best opportunity; in the post-settlement window an open
//! position is closed. Every other tick is a no-op. A failed transition leaves the state as it
//! was, so a failed close is retried on the next tick inside the window.
//!
//! An open is only sent while the pre-settlement window is still running at submission time;
//! trade records carry the submission time, not the tick time.

use crate::config::StrategyConfig;
use crate::error::{EngineError, OrderError};
use crate::events::{FundingObservation, OrderRequest, OrderSide, TradeAction, TradeRecord};
use crate::market::{DataSource, InstrumentQuote, Sourced};
use crate::position::Position;
use crate::position_sizing::{
    calculate_position_size, effective_leverage, investment_amount, limit_price,
};
use crate::scanner::OpportunityScanner;
use crate::schedule::{SettlementSchedule, WindowPhase};
use crate::traits::{Ledger, MarketDataSource, TradingVenue};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const FILLED: &str = "filled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Open(Position),
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Neither settlement window is active.
    OutsideWindow,
    /// Inside a window but the current state has nothing to do there.
    NothingToDo,
    /// Pre-settlement scan found no rate below the threshold.
    NoOpportunity,
    /// The pre-settlement window ended before the open order could be sent.
    MissedWindow,
    Opened(TradeRecord),
    Closed(TradeRecord),
}

pub struct PositionEngine<M, V, L>
where
    M: MarketDataSource,
    V: TradingVenue,
    L: Ledger,
{
    market: M,
    venue: V,
    ledger: L,
    scanner: OpportunityScanner,
    schedule: SettlementSchedule,
    strategy: StrategyConfig,
    allow_synthetic_data: bool,
    state: EngineState,
    /// Latest `observed_at` already written to the ledger.
    funding_recorded_through: Option<DateTime<Utc>>,
}

impl<M, V, L> PositionEngine<M, V, L>
where
    M: MarketDataSource,
    V: TradingVenue,
    L: Ledger,
{
    /// # Errors
    ///
    /// Returns an error if the settlement windows in `strategy` are invalid.
    pub fn new(
        market: M,
        venue: V,
        ledger: L,
        strategy: StrategyConfig,
        allow_synthetic_data: bool,
    ) -> Result<Self> {
        let schedule = SettlementSchedule::new(
            strategy.settlement_period_secs,
            strategy.pre_settlement_secs,
            strategy.post_settlement_secs,
        )?;

        Ok(Self {
            market,
            venue,
            ledger,
            scanner: OpportunityScanner::new(strategy.funding_threshold),
            schedule,
            strategy,
            allow_synthetic_data,
            state: EngineState::Idle,
            funding_recorded_through: None,
        })
    }

    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Runs one scheduling step at `now`.
    ///
    /// Order submission times are `now` plus the time this call has spent awaiting the exchange.
    ///
    /// # Errors
    ///
    /// Returns the reason a transition did not happen. The state is unchanged, except for
    /// [`EngineError::Ledger`] after a fill: the position state already reflects the fill and
    /// only the trade record is missing.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, EngineError> {
        let started = Instant::now();
        let held = match &self.state {
            EngineState::Idle => None,
            EngineState::Open(position) => Some(position.clone()),
        };

        match (self.schedule.phase(now), held) {
            (WindowPhase::Outside, _) => Ok(TickOutcome::OutsideWindow),
            (WindowPhase::PreSettlement, None) => self.try_open(now, started).await,
            (WindowPhase::PostSettlement, Some(position)) => {
                self.try_close(now, started, position).await
            }
            (WindowPhase::PreSettlement, Some(_)) | (WindowPhase::PostSettlement, None) => {
                Ok(TickOutcome::NothingToDo)
            }
        }
    }

    /// Ticks every `tick_interval_ms` until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A tick in progress always completes; shutdown is only observed between ticks.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_millis(self.strategy.tick_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            venue = self.venue.name(),
            threshold = %self.scanner.threshold(),
            tick_ms = self.strategy.tick_interval_ms,
            "Position engine started"
        );

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }

                    _ = ticker.tick() => {
                        match self.tick(Utc::now()).await {
                            Ok(TickOutcome::Opened(_) | TickOutcome::Closed(_)) => {}
                            Ok(outcome) => debug!(?outcome, "Tick"),
                            Err(e) => warn!(error = %e, "Tick ended without transition"),
                        }
                    }
                }
            }
        }

        match &self.state {
            EngineState::Open(position) => warn!(
                instrument = %position.instrument,
                size = %position.size,
                "Engine stopped with an open position; it remains open on the exchange"
            ),
            EngineState::Idle => info!("Position engine stopped"),
        }
    }

    async fn try_open(
        &mut self,
        now: DateTime<Utc>,
        started: Instant,
    ) -> Result<TickOutcome, EngineError> {
        let snapshot = self.market.funding_quotes().await?;
        self.record_new_observations(&snapshot).await;
        self.ensure_live(snapshot.source, "funding")?;

        let Some(quote) = self.scanner.select_best_quote(&snapshot.value).cloned() else {
            return Ok(TickOutcome::NoOpportunity);
        };

        let meta = self.market.instrument(&quote.symbol).await?;
        self.ensure_live(snapshot.source.and(meta.source), "instrument")?;
        let meta = meta
            .value
            .ok_or_else(|| OrderError::UnknownInstrument(quote.symbol.clone()))?;

        let margin = self.venue.margin_summary().await?;
        let available = margin.available();
        if let Err(e) = self
            .ledger
            .record_balance(margin.account_value, available)
            .await
        {
            warn!(error = %e, "Failed to record balance observation");
        }

        let price = quote.mark_price;
        if price <= Decimal::ZERO {
            return Err(EngineError::NoPrice(quote.symbol));
        }

        let leverage = effective_leverage(self.strategy.leverage, meta.max_leverage);
        let min_notional = self.strategy.min_order_notional.max(meta.size_step() * price);
        let required = min_notional / Decimal::from(leverage);
        if available <= Decimal::ZERO {
            return Err(EngineError::InsufficientFunds { available, required });
        }

        let invest = investment_amount(
            available,
            self.strategy.margin_utilization,
            self.strategy.investment_cap,
        );
        let size = calculate_position_size(invest, leverage, price, meta.sz_decimals)
            .map_err(|_| EngineError::NoPrice(quote.symbol.clone()))?;
        if size < meta.size_step() || size * price < self.strategy.min_order_notional {
            return Err(EngineError::InsufficientFunds { available, required });
        }

        let order = OrderRequest {
            symbol: quote.symbol.clone(),
            asset_index: meta.asset_index,
            side: OrderSide::Buy,
            size,
            limit_price: limit_price(price, OrderSide::Buy, self.strategy.slippage, meta.sz_decimals),
            reduce_only: false,
        };

        let submitted_at = wall_time_since(now, started);
        if self.schedule.phase(submitted_at) != WindowPhase::PreSettlement {
            warn!(
                instrument = %order.symbol,
                action = "open",
                elapsed_ms = started.elapsed().as_millis(),
                "Pre-settlement window closed before the order could be sent"
            );
            return Ok(TickOutcome::MissedWindow);
        }

        let fill = self.venue.submit_order(&order).await.inspect_err(|e| {
            error!(instrument = %order.symbol, action = "open", error = %e, "Open order failed");
        })?;

        let position = Position {
            instrument: quote.symbol.clone(),
            asset_index: meta.asset_index,
            size: fill.filled_size,
            entry_price: fill.avg_price,
            funding_rate_at_entry: quote.funding_rate,
            leverage,
            opened_at: submitted_at,
        };
        let record = TradeRecord {
            timestamp: submitted_at,
            instrument: quote.symbol,
            action: TradeAction::Open,
            price: fill.avg_price,
            size: fill.filled_size,
            leverage,
            funding_rate: quote.funding_rate,
            profit: Decimal::ZERO,
            balance_before: available,
            balance_after: available,
            status: FILLED.to_string(),
        };

        info!(
            instrument = %record.instrument,
            size = %record.size,
            price = %record.price,
            funding_rate = %record.funding_rate,
            leverage,
            "Position opened"
        );
        self.state = EngineState::Open(position);
        self.ledger
            .record_trade(&record)
            .await
            .map_err(EngineError::Ledger)?;

        Ok(TickOutcome::Opened(record))
    }

    async fn try_close(
        &mut self,
        now: DateTime<Utc>,
        started: Instant,
        position: Position,
    ) -> Result<TickOutcome, EngineError> {
        let price = self.market.price(&position.instrument).await?;
        self.ensure_live(price.source, "price")?;
        if price.value <= Decimal::ZERO {
            return Err(EngineError::NoPrice(position.instrument));
        }

        let meta = self.market.instrument(&position.instrument).await?;
        self.ensure_live(price.source.and(meta.source), "instrument")?;
        let meta = meta
            .value
            .ok_or_else(|| OrderError::UnknownInstrument(position.instrument.clone()))?;

        let margin = self.venue.margin_summary().await?;

        let order = OrderRequest {
            symbol: position.instrument.clone(),
            asset_index: position.asset_index,
            side: OrderSide::Sell,
            size: position.size,
            limit_price: limit_price(
                price.value,
                OrderSide::Sell,
                self.strategy.slippage,
                meta.sz_decimals,
            ),
            reduce_only: true,
        };

        let submitted_at = wall_time_since(now, started);
        let fill = self.venue.submit_order(&order).await.inspect_err(|e| {
            error!(
                instrument = %order.symbol,
                action = "close",
                error = %e,
                "Close order failed; position kept"
            );
        })?;

        let profit = position.realized_profit(fill.avg_price, self.strategy.funding_periods_per_day);
        let record = TradeRecord {
            timestamp: submitted_at,
            instrument: position.instrument,
            action: TradeAction::Close,
            price: fill.avg_price,
            size: position.size,
            leverage: position.leverage,
            funding_rate: position.funding_rate_at_entry,
            profit,
            balance_before: margin.account_value,
            balance_after: margin.account_value + profit,
            status: FILLED.to_string(),
        };

        info!(
            instrument = %record.instrument,
            size = %record.size,
            exit_price = %record.price,
            profit = %profit,
            "Position closed"
        );
        self.state = EngineState::Idle;
        self.ledger
            .record_trade(&record)
            .await
            .map_err(EngineError::Ledger)?;

        Ok(TickOutcome::Closed(record))
    }

    fn ensure_live(&self, source: DataSource, what: &'static str) -> Result<(), EngineError> {
        if source.is_live() || self.allow_synthetic_data {
            Ok(())
        } else {
            Err(EngineError::SyntheticData(what))
        }
    }

    /// Appends the quotes not yet recorded. A cached snapshot served again adds nothing.
    async fn record_new_observations(&mut self, snapshot: &Sourced<Vec<InstrumentQuote>>) {
        let recorded_through = self.funding_recorded_through;
        let observations: Vec<FundingObservation> = snapshot
            .value
            .iter()
            .filter(|quote| recorded_through.map_or(true, |t| quote.observed_at > t))
            .map(|quote| FundingObservation {
                timestamp: quote.observed_at,
                instrument: quote.symbol.clone(),
                funding_rate: quote.funding_rate,
                source: snapshot.source,
            })
            .collect();
        if observations.is_empty() {
            debug!("Funding snapshot already recorded");
            return;
        }

        match self.ledger.record_funding_batch(&observations).await {
            Ok(()) => {
                self.funding_recorded_through = observations.iter().map(|o| o.timestamp).max();
            }
            Err(e) => {
                warn!(error = %e, count = observations.len(), "Failed to record funding observations");
            }
        }
    }
}

/// `now` advanced by the time elapsed since `started`.
fn wall_time_since(now: DateTime<Utc>, started: Instant) -> DateTime<Utc> {
    ChronoDuration::from_std(started.elapsed()).map_or(now, |elapsed| now + elapsed)
}
