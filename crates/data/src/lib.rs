//! Persistence for the funding-rate arbitrage engine.
//!
//! The only store is an append-only `SQLite` ledger with embedded migrations.

pub mod ledger;

pub use ledger::{SqliteLedger, StoredFundingRate, StoredTrade};
