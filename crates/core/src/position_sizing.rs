use crate::events::OrderSide;
use anyhow::Result;
use rust_decimal::{Decimal, RoundingStrategy};

/// Significant figures accepted by the exchange for perpetual prices.
const PRICE_SIG_FIGS: i32 = 5;

/// Maximum price decimals for perpetuals before subtracting `sz_decimals`.
const MAX_PRICE_DECIMALS: u32 = 6;

/// Margin to commit to a new position: `min(available * utilization, cap)`, never negative.
///
/// # Arguments
/// * `available_margin` - Free margin reported by the exchange
/// * `utilization` - Share of free margin to commit (0.0-1.0)
/// * `cap` - Upper bound on committed margin
#[must_use]
pub fn investment_amount(available_margin: Decimal, utilization: Decimal, cap: Decimal) -> Decimal {
    (available_margin * utilization).min(cap).max(Decimal::ZERO)
}

/// Configured leverage capped at the instrument maximum, at least 1x.
#[must_use]
pub fn effective_leverage(configured: u32, instrument_max: u32) -> u32 {
    configured.min(instrument_max).max(1)
}

/// Calculate position size for a margin amount at leverage, rounded down to the size step.
///
/// # Errors
/// Returns error if the price is not positive
pub fn calculate_position_size(
    margin: Decimal,
    leverage: u32,
    price: Decimal,
    sz_decimals: u32,
) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        anyhow::bail!("Entry price must be positive");
    }

    let notional = margin * Decimal::from(leverage);
    let size = notional / price;

    Ok(round_size(size, sz_decimals))
}

/// Round a size down to `sz_decimals` places.
#[must_use]
pub fn round_size(size: Decimal, sz_decimals: u32) -> Decimal {
    size.round_dp_with_strategy(sz_decimals, RoundingStrategy::ToZero)
        .normalize()
}

/// Round a price to 5 significant figures and at most `6 - sz_decimals` decimals.
/// Integer prices are always valid.
#[must_use]
pub fn round_price(price: Decimal, sz_decimals: u32) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let max_decimals = MAX_PRICE_DECIMALS.saturating_sub(sz_decimals);
    let sig_decimals = (PRICE_SIG_FIGS - 1 - magnitude(price)).max(0);
    let decimals = u32::try_from(sig_decimals).unwrap_or(0).min(max_decimals);

    price
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// IOC limit price: reference price moved by `slippage` against us, then rounded.
#[must_use]
pub fn limit_price(reference: Decimal, side: OrderSide, slippage: Decimal, sz_decimals: u32) -> Decimal {
    let adjusted = match side {
        OrderSide::Buy => reference * (Decimal::ONE + slippage),
        OrderSide::Sell => reference * (Decimal::ONE - slippage),
    };
    round_price(adjusted, sz_decimals)
}

/// Base-10 exponent `e` with `10^e <= value < 10^(e+1)`, for positive values.
fn magnitude(value: Decimal) -> i32 {
    let ten = Decimal::TEN;
    let mut exponent = 0;
    let mut scaled = value;
    while scaled >= ten {
        scaled /= ten;
        exponent += 1;
    }
    while scaled < Decimal::ONE {
        scaled *= ten;
        exponent -= 1;
    }
    exponent
}
