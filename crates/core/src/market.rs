use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a piece of market data came from.
///
/// Synthetic data is produced locally when the exchange cannot be reached. It keeps the system
/// operable for demos and tests but must never drive real trades.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Live,
    Synthetic,
}

impl DataSource {
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
        }
    }

    /// Combines two sources; the result is synthetic if either input is.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        if self.is_live() && other.is_live() {
            Self::Live
        } else {
            Self::Synthetic
        }
    }
}

/// A value tagged with its [`DataSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Sourced<T> {
    #[must_use]
    pub const fn live(value: T) -> Self {
        Self {
            value,
            source: DataSource::Live,
        }
    }

    #[must_use]
    pub const fn synthetic(value: T) -> Self {
        Self {
            value,
            source: DataSource::Synthetic,
        }
    }

    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.source.is_live()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
        }
    }
}

/// Funding rate and mark price for one perpetual at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentQuote {
    pub symbol: String,
    pub funding_rate: Decimal,
    pub mark_price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Static trading parameters of a perpetual, taken from the exchange universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub symbol: String,
    /// Position of the instrument in the exchange universe; orders reference assets by index.
    pub asset_index: u32,
    /// Number of decimals allowed in an order size.
    pub sz_decimals: u32,
    pub max_leverage: u32,
}

impl InstrumentMeta {
    /// Smallest order size increment (`10^-sz_decimals`), which is also the minimum size.
    #[must_use]
    pub fn size_step(&self) -> Decimal {
        Decimal::new(1, self.sz_decimals)
    }
}

/// Account margin as reported by the exchange clearinghouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginSummary {
    pub account_value: Decimal,
    pub total_margin_used: Decimal,
}

impl MarginSummary {
    #[must_use]
    pub fn available(&self) -> Decimal {
        self.account_value - self.total_margin_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_source_combination() {
        assert_eq!(DataSource::Live.and(DataSource::Live), DataSource::Live);
        assert_eq!(DataSource::Live.and(DataSource::Synthetic), DataSource::Synthetic);
        assert_eq!(DataSource::Synthetic.and(DataSource::Live), DataSource::Synthetic);
    }

    #[test]
    fn test_size_step() {
        let meta = InstrumentMeta {
            symbol: "BTC".to_string(),
            asset_index: 0,
            sz_decimals: 5,
            max_leverage: 50,
        };
        assert_eq!(meta.size_step(), dec!(0.00001));
    }

    #[test]
    fn test_available_margin() {
        let summary = MarginSummary {
            account_value: dec!(1000),
            total_margin_used: dec!(100),
        };
        assert_eq!(summary.available(), dec!(900));
    }
}
