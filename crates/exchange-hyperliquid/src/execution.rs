use crate::gateway::ExchangeGateway;
use crate::models::{
    wire_decimal, ExchangeResponse, OrderAction, OrderStatus, OrderType, OrderWire,
};
use crate::wallet::WalletSigner;
use async_trait::async_trait;
use chrono::Utc;
use funding_arb_core::error::{GatewayError, OrderError};
use funding_arb_core::events::{OrderFill, OrderRequest};
use funding_arb_core::market::MarginSummary;
use funding_arb_core::traits::TradingVenue;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Signed IOC orders against the real exchange.
pub struct LiveVenue {
    gateway: Arc<ExchangeGateway>,
    signer: Arc<WalletSigner>,
}

impl LiveVenue {
    /// Creates a new live trading venue
    #[must_use]
    pub const fn new(gateway: Arc<ExchangeGateway>, signer: Arc<WalletSigner>) -> Self {
        Self { gateway, signer }
    }

    fn order_action(order: &OrderRequest) -> OrderAction {
        OrderAction::single(OrderWire {
            a: order.asset_index,
            b: order.side.is_buy(),
            p: wire_decimal(order.limit_price),
            s: wire_decimal(order.size),
            r: order.reduce_only,
            t: OrderType::immediate_or_cancel(),
        })
    }
}

#[async_trait]
impl TradingVenue for LiveVenue {
    async fn margin_summary(&self) -> Result<MarginSummary, GatewayError> {
        self.gateway.margin_summary(self.signer.address()).await
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderFill, OrderError> {
        let action = serde_json::to_value(Self::order_action(order))
            .map_err(|e| OrderError::Signing(e.to_string()))?;
        let nonce = self.signer.next_nonce();
        let signature = self
            .signer
            .sign(&action, nonce)
            .await
            .map_err(|e| OrderError::Signing(e.to_string()))?;

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
        });
        debug!(instrument = %order.symbol, nonce, "Submitting order");

        let response = self.gateway.post_exchange(&body).await?;

        let ok = match response {
            ExchangeResponse::Ok(ok) => ok,
            ExchangeResponse::Err(message) => return Err(OrderError::Rejected(message)),
        };

        let status = ok
            .data
            .and_then(|d| d.statuses.into_iter().next())
            .ok_or_else(|| OrderError::Rejected("No order status in response".to_string()))?;

        match status {
            OrderStatus::Filled(filled) => {
                info!(
                    instrument = %order.symbol,
                    oid = filled.oid,
                    size = %filled.total_sz,
                    avg_px = %filled.avg_px,
                    "Order filled"
                );
                Ok(OrderFill {
                    order_id: filled.oid,
                    symbol: order.symbol.clone(),
                    side: order.side,
                    filled_size: filled.total_sz,
                    avg_price: filled.avg_px,
                    timestamp: Utc::now(),
                })
            }
            OrderStatus::Resting(resting) => Err(OrderError::Rejected(format!(
                "IOC order {} rested instead of filling",
                resting.oid
            ))),
            OrderStatus::Error(message) => Err(OrderError::Rejected(message)),
        }
    }

    fn name(&self) -> &str {
        "hyperliquid"
    }
}
