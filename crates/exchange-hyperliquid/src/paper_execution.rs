use async_trait::async_trait;
use chrono::Utc;
use funding_arb_core::error::{GatewayError, OrderError};
use funding_arb_core::events::{OrderFill, OrderRequest, OrderSide};
use funding_arb_core::market::MarginSummary;
use funding_arb_core::position_sizing::effective_leverage;
use funding_arb_core::traits::{MarketDataSource, TradingVenue};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct PaperHolding {
    size: Decimal,
    entry_price: Decimal,
    leverage: Decimal,
}

impl PaperHolding {
    fn margin(&self) -> Decimal {
        self.size * self.entry_price / self.leverage
    }
}

#[derive(Debug)]
struct PaperAccount {
    account_value: Decimal,
    holdings: HashMap<String, PaperHolding>,
}

impl PaperAccount {
    fn margin_used(&self) -> Decimal {
        self.holdings.values().map(PaperHolding::margin).sum()
    }
}

/// Paper trading venue for running the engine against live market data.
///
/// Orders never leave the process: they fill at the current quoted price when that price is
/// within the order's limit. Margin is tracked locally from a starting balance, with long
/// holdings only (the engine never shorts). Each holding is margined at the configured leverage
/// capped by the instrument maximum. Synthetic prices or instrument data are refused unless
/// [`PaperVenue::with_synthetic_data`] enables them.
///
/// # Safety
///
/// This venue makes **zero order API calls**. Only market data is read through `market`.
pub struct PaperVenue<M: MarketDataSource> {
    market: M,
    leverage: u32,
    allow_synthetic_data: bool,
    account: Mutex<PaperAccount>,
    next_order_id: AtomicU64,
}

impl<M: MarketDataSource> PaperVenue<M> {
    /// # Arguments
    ///
    /// * `market` - Source of fill prices
    /// * `starting_balance` - Initial account value in USDC
    /// * `leverage` - Configured leverage, capped per instrument when converting notional into
    ///   margin used
    #[must_use]
    pub fn new(market: M, starting_balance: Decimal, leverage: u32) -> Self {
        Self {
            market,
            leverage: leverage.max(1),
            allow_synthetic_data: false,
            account: Mutex::new(PaperAccount {
                account_value: starting_balance,
                holdings: HashMap::new(),
            }),
            next_order_id: AtomicU64::new(1),
        }
    }

    /// Lets orders fill on synthetic market data. Only meant for demos and tests.
    #[must_use]
    pub fn with_synthetic_data(mut self, allow: bool) -> Self {
        self.allow_synthetic_data = allow;
        self
    }

    /// Size currently held in `symbol`.
    #[must_use]
    pub fn holding(&self, symbol: &str) -> Decimal {
        self.account
            .lock()
            .holdings
            .get(symbol)
            .map_or(Decimal::ZERO, |h| h.size)
    }
}

#[async_trait]
impl<M: MarketDataSource> TradingVenue for PaperVenue<M> {
    async fn margin_summary(&self) -> Result<MarginSummary, GatewayError> {
        let account = self.account.lock();
        Ok(MarginSummary {
            account_value: account.account_value,
            total_margin_used: account.margin_used(),
        })
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderFill, OrderError> {
        if order.size <= Decimal::ZERO {
            return Err(OrderError::Rejected("order size must be positive".to_string()));
        }
        let quoted = self.market.price(&order.symbol).await?;
        let mut source = quoted.source;
        let price = quoted.value;

        // Only opening fills consume margin, so only they need the instrument's leverage cap.
        let leverage = if order.side.is_buy() {
            let meta = self.market.instrument(&order.symbol).await?;
            source = source.and(meta.source);
            let max_leverage = meta
                .value
                .ok_or_else(|| OrderError::UnknownInstrument(order.symbol.clone()))?
                .max_leverage;
            Decimal::from(effective_leverage(self.leverage, max_leverage))
        } else {
            Decimal::ONE
        };

        if !source.is_live() && !self.allow_synthetic_data {
            return Err(OrderError::Rejected(format!(
                "refusing to fill {} on synthetic market data",
                order.symbol
            )));
        }

        let crosses = match order.side {
            OrderSide::Buy => price <= order.limit_price,
            OrderSide::Sell => price >= order.limit_price,
        };
        if !crosses {
            return Err(OrderError::Rejected(format!(
                "price {price} outside limit {} for {}",
                order.limit_price, order.symbol
            )));
        }

        let filled_size = {
            let mut account = self.account.lock();
            match order.side {
                OrderSide::Buy if order.reduce_only => {
                    return Err(OrderError::Rejected(
                        "paper venue holds long positions only".to_string(),
                    ));
                }
                OrderSide::Buy => {
                    let required = order.size * price / leverage;
                    if required > account.account_value - account.margin_used() {
                        return Err(OrderError::Rejected(format!(
                            "insufficient paper margin: need {required}"
                        )));
                    }

                    let holding = account
                        .holdings
                        .entry(order.symbol.clone())
                        .or_insert(PaperHolding {
                            size: Decimal::ZERO,
                            entry_price: price,
                            leverage,
                        });
                    let new_size = holding.size + order.size;
                    holding.entry_price =
                        (holding.size * holding.entry_price + order.size * price) / new_size;
                    holding.size = new_size;
                    holding.leverage = leverage;
                    order.size
                }
                OrderSide::Sell => {
                    if !order.reduce_only {
                        return Err(OrderError::Rejected(
                            "paper venue holds long positions only".to_string(),
                        ));
                    }
                    let Some(holding) = account.holdings.get(&order.symbol).copied() else {
                        return Err(OrderError::Rejected(format!(
                            "no {} position to reduce",
                            order.symbol
                        )));
                    };

                    let size = order.size.min(holding.size);
                    account.account_value += (price - holding.entry_price) * size;
                    if size == holding.size {
                        account.holdings.remove(&order.symbol);
                    } else if let Some(h) = account.holdings.get_mut(&order.symbol) {
                        h.size -= size;
                    }
                    size
                }
            }
        };

        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        info!(
            instrument = %order.symbol,
            side = ?order.side,
            size = %filled_size,
            price = %price,
            "Paper fill"
        );

        Ok(OrderFill {
            order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            filled_size,
            avg_price: price,
            timestamp: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}
