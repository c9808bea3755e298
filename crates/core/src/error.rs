//! Error taxonomy shared by the gateway, trading venues and the position engine.
//!
//! Transient gateway errors are retried inside the gateway and only surface once the retry
//! budget is spent. Business errors end the current tick without a state transition.

use rust_decimal::Decimal;
use thiserror::Error;

/// Failures of a single exchange API call after the retry policy has run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The exchange kept answering 429 until the retry budget ran out.
    #[error("rate limited by exchange after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// The request or the response did not match the expected schema. Never retried.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Connection-level failure (DNS, refused, reset).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl GatewayError {
    /// Whether the failure means the exchange was unreachable rather than the request being wrong.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::MalformedRequest(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    /// The exchange answered but refused the order.
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Reasons a tick ended without the intended transition.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    #[error("refusing to trade on synthetic {0} data")]
    SyntheticData(&'static str),

    #[error("no tradable price for {0}")]
    NoPrice(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("ledger write failed: {0}")]
    Ledger(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::RateLimitExceeded { attempts: 3 }.is_transient());
        assert!(GatewayError::Timeout { attempts: 3 }.is_transient());
        assert!(GatewayError::Transport("connection refused".into()).is_transient());
        assert!(GatewayError::Http { status: 502, body: String::new() }.is_transient());
        assert!(!GatewayError::Http { status: 404, body: String::new() }.is_transient());
        assert!(!GatewayError::MalformedRequest("bad".into()).is_transient());
    }
}
