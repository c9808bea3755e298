//! Selection of the single best funding-rate opportunity.

use crate::market::InstrumentQuote;
use rust_decimal::Decimal;

/// Picks the instrument with the most negative funding rate below a threshold.
///
/// Pure: no I/O and no state besides the threshold. Ties keep the first quote in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpportunityScanner {
    threshold: Decimal,
}

impl OpportunityScanner {
    #[must_use]
    pub const fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub const fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Returns `(symbol, funding_rate)` of the best qualifying quote, if any.
    #[must_use]
    pub fn select_best(&self, quotes: &[InstrumentQuote]) -> Option<(String, Decimal)> {
        self.select_best_quote(quotes)
            .map(|quote| (quote.symbol.clone(), quote.funding_rate))
    }

    #[must_use]
    pub fn select_best_quote<'a>(&self, quotes: &'a [InstrumentQuote]) -> Option<&'a InstrumentQuote> {
        let mut best: Option<&InstrumentQuote> = None;
        for quote in quotes.iter().filter(|q| q.funding_rate < self.threshold) {
            // strict comparison keeps the earlier quote on ties
            if best.map_or(true, |b| quote.funding_rate < b.funding_rate) {
                best = Some(quote);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str, rate: Decimal) -> InstrumentQuote {
        InstrumentQuote {
            symbol: symbol.to_string(),
            funding_rate: rate,
            mark_price: dec!(100),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_selects_most_negative_below_threshold() {
        let scanner = OpportunityScanner::new(dec!(-0.0001));
        let quotes = vec![quote("BTC", dec!(-0.0003)), quote("ETH", dec!(0.0001))];

        assert_eq!(
            scanner.select_best(&quotes),
            Some(("BTC".to_string(), dec!(-0.0003)))
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let scanner = OpportunityScanner::new(dec!(-0.0001));
        let quotes = vec![quote("BTC", dec!(-0.0001)), quote("ETH", dec!(0))];

        assert_eq!(scanner.select_best(&quotes), None);
    }

    #[test]
    fn test_ties_keep_first_encountered() {
        let scanner = OpportunityScanner::new(dec!(-0.0001));
        let quotes = vec![
            quote("SOL", dec!(-0.0002)),
            quote("AVAX", dec!(-0.0005)),
            quote("LINK", dec!(-0.0005)),
        ];

        assert_eq!(
            scanner.select_best(&quotes),
            Some(("AVAX".to_string(), dec!(-0.0005)))
        );

        let reversed: Vec<_> = quotes.iter().rev().cloned().collect();
        assert_eq!(
            scanner.select_best(&reversed),
            Some(("LINK".to_string(), dec!(-0.0005)))
        );
    }

    #[test]
    fn test_empty_input() {
        let scanner = OpportunityScanner::new(dec!(-0.0001));
        assert_eq!(scanner.select_best(&[]), None);
    }

    #[test]
    fn test_result_is_minimum_of_qualifying_and_deterministic() {
        let scanner = OpportunityScanner::new(dec!(-0.0001));
        let quotes = vec![
            quote("A", dec!(-0.0004)),
            quote("B", dec!(0.0009)),
            quote("C", dec!(-0.0011)),
            quote("D", dec!(-0.00005)),
            quote("E", dec!(-0.0007)),
        ];

        let first = scanner.select_best(&quotes);
        let min = quotes
            .iter()
            .map(|q| q.funding_rate)
            .filter(|r| *r < dec!(-0.0001))
            .min();

        assert_eq!(first.as_ref().map(|(_, r)| *r), min);
        assert_eq!(first, scanner.select_best(&quotes));
        assert_eq!(first.map(|(s, _)| s), Some("C".to_string()));
    }
}
