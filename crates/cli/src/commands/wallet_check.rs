//! `wallet-check`: loads the configured wallet and proves it can sign.

use anyhow::Result;
use clap::Args;
use funding_arb_core::AppConfig;
use funding_arb_hyperliquid::load_signer;
use serde_json::json;

/// Arguments for the wallet-check command.
#[derive(Args, Debug, Clone)]
pub struct WalletCheckArgs {
    /// Also query the account's margin summary from the exchange
    #[arg(long)]
    pub balance: bool,
}

/// Runs the wallet-check command.
///
/// # Errors
/// Returns an error if the wallet cannot be loaded, signing fails, or the balance query fails.
pub async fn run_wallet_check(config: &AppConfig, args: WalletCheckArgs) -> Result<()> {
    let signer = load_signer(&config.wallet)?;
    let nonce = signer.next_nonce();
    signer.sign(&json!({"type": "walletCheck"}), nonce).await?;
    println!("Wallet {} OK (decrypts and signs)", signer.address());

    if args.balance {
        let gateway = super::build_gateway(config)?;
        let summary = gateway.margin_summary(signer.address()).await?;
        println!(
            "Account value {} USDC, margin used {}, available {}",
            summary.account_value,
            summary.total_margin_used,
            summary.available()
        );
    }

    Ok(())
}
