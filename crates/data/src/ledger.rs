use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use funding_arb_core::events::{FundingObservation, TradeRecord};
use funding_arb_core::market::DataSource;
use funding_arb_core::traits::Ledger;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::debug;

const INSERT_FUNDING: &str = r"
    INSERT INTO funding_rates (timestamp, datetime, instrument, funding_rate, source)
    VALUES (?1, ?2, ?3, ?4, ?5)
";

/// `SQLite` ledger of trades, funding observations and balance snapshots.
///
/// Every write is an insert. Nothing is ever updated or deleted, so recording the same trade
/// twice leaves two rows. External readers (dashboards, notebooks) consume the tables directly.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

/// A row of the `trades` table as stored.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: i64,
    pub timestamp: i64,
    pub datetime: String,
    pub instrument: String,
    pub action: String,
    pub price: String,
    pub size: String,
    pub leverage: i64,
    pub funding_rate: String,
    pub profit: String,
    pub balance_before: String,
    pub balance_after: String,
    pub status: String,
}

impl StoredTrade {
    /// # Errors
    /// Returns error if the stored text is not a decimal
    pub fn profit(&self) -> Result<Decimal> {
        Decimal::from_str(&self.profit).with_context(|| format!("bad profit {:?}", self.profit))
    }
}

/// A row of the `funding_rates` table as stored.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredFundingRate {
    pub timestamp: i64,
    pub instrument: String,
    pub funding_rate: String,
    pub source: String,
}

impl SqliteLedger {
    /// Opens (or creates) the database and applies pending migrations.
    ///
    /// # Arguments
    ///
    /// * `database_url` - `SQLite` URL, e.g. `sqlite://funding_arb.db?mode=rwc`
    ///
    /// # Errors
    ///
    /// Returns error if connection fails or migrations fail.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open ledger at {database_url}"))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        debug!(url = database_url, "Ledger ready");
        Ok(Self { pool })
    }

    /// Creates an in-memory database for testing.
    ///
    /// A single connection that never expires keeps the in-memory database alive.
    ///
    /// # Errors
    ///
    /// Returns error if connection fails.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Most recent trades first.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub async fn recent_trades(&self, limit: u32) -> Result<Vec<StoredTrade>> {
        let rows = sqlx::query_as::<_, StoredTrade>(
            r"
            SELECT id, timestamp, datetime, instrument, action, price, size, leverage,
                   funding_rate, profit, balance_before, balance_after, status
            FROM trades
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Funding observations for one instrument, oldest first.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub async fn funding_history(&self, instrument: &str) -> Result<Vec<StoredFundingRate>> {
        let rows = sqlx::query_as::<_, StoredFundingRate>(
            r"
            SELECT timestamp, instrument, funding_rate, source
            FROM funding_rates
            WHERE instrument = ?1
            ORDER BY timestamp ASC, id ASC
            ",
        )
        .bind(instrument)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Sum of realized profit over all close trades.
    ///
    /// # Errors
    /// Returns error if the query fails or a stored profit is not a decimal.
    pub async fn realized_profit(&self) -> Result<Decimal> {
        let profits = sqlx::query_scalar::<_, String>(
            "SELECT profit FROM trades WHERE action = 'close'",
        )
        .fetch_all(&self.pool)
        .await?;

        profits.iter().try_fold(Decimal::ZERO, |acc, p| {
            Decimal::from_str(p)
                .map(|v| acc + v)
                .with_context(|| format!("bad profit {p:?}"))
        })
    }

    /// Latest recorded `(balance, available_margin)`.
    ///
    /// # Errors
    /// Returns error if the query fails or a stored value is not a decimal.
    pub async fn latest_balance(&self) -> Result<Option<(Decimal, Decimal)>> {
        let row = sqlx::query_as::<_, (String, String)>(
            r"
            SELECT balance, available_margin
            FROM wallet_balances
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(balance, available)| -> Result<(Decimal, Decimal)> {
            Ok((Decimal::from_str(&balance)?, Decimal::from_str(&available)?))
        })
        .transpose()
    }

    async fn insert_funding(
        &self,
        at: DateTime<Utc>,
        instrument: &str,
        funding_rate: Decimal,
        source: DataSource,
    ) -> Result<()> {
        sqlx::query(INSERT_FUNDING)
            .bind(at.timestamp_millis())
            .bind(at.to_rfc3339())
            .bind(instrument)
            .bind(funding_rate.to_string())
            .bind(source.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn record_trade(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO trades
                (timestamp, datetime, instrument, action, price, size, leverage,
                 funding_rate, profit, balance_before, balance_after, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(record.timestamp.timestamp_millis())
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.instrument)
        .bind(record.action.as_str())
        .bind(record.price.to_string())
        .bind(record.size.to_string())
        .bind(i64::from(record.leverage))
        .bind(record.funding_rate.to_string())
        .bind(record.profit.to_string())
        .bind(record.balance_before.to_string())
        .bind(record.balance_after.to_string())
        .bind(&record.status)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record {} trade", record.action.as_str()))?;

        debug!(
            instrument = %record.instrument,
            action = record.action.as_str(),
            "Trade recorded"
        );
        Ok(())
    }

    async fn record_funding(&self, symbol: &str, funding_rate: Decimal) -> Result<()> {
        self.insert_funding(Utc::now(), symbol, funding_rate, DataSource::Live)
            .await
    }

    async fn record_funding_batch(&self, observations: &[FundingObservation]) -> Result<()> {
        if observations.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for obs in observations {
            sqlx::query(INSERT_FUNDING)
                .bind(obs.timestamp.timestamp_millis())
                .bind(obs.timestamp.to_rfc3339())
                .bind(&obs.instrument)
                .bind(obs.funding_rate.to_string())
                .bind(obs.source.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(count = observations.len(), "Funding observations recorded");
        Ok(())
    }

    async fn record_balance(&self, balance: Decimal, available_margin: Decimal) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO wallet_balances (timestamp, datetime, balance, available_margin)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(now.timestamp_millis())
        .bind(now.to_rfc3339())
        .bind(balance.to_string())
        .bind(available_margin.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
