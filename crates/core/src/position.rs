use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single position the engine may hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub asset_index: u32,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub funding_rate_at_entry: Decimal,
    pub leverage: u32,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Realized profit of closing at `exit_price`.
    ///
    /// `(entry - exit) * size + entry * (funding_rate_at_entry / periods_per_day)`. The funding
    /// term approximates one settlement payment from the entry rate; the number of settlements
    /// actually realized while the position was held is not observed.
    #[must_use]
    pub fn realized_profit(&self, exit_price: Decimal, funding_periods_per_day: u32) -> Decimal {
        let price_component = (self.entry_price - exit_price) * self.size;
        let periods = Decimal::from(funding_periods_per_day.max(1));
        let funding_component = self.entry_price * (self.funding_rate_at_entry / periods);
        price_component + funding_component
    }
}
