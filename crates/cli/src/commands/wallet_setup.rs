//! `wallet-setup`: encrypts a private key into a wallet file.

use anyhow::{bail, Context, Result};
use clap::Args;
use funding_arb_core::AppConfig;
use funding_arb_hyperliquid::{KeyCipher, WalletSigner};
use secrecy::{ExposeSecret, SecretString};
use std::path::Path;

/// Arguments for the wallet-setup command.
#[derive(Args, Debug, Clone)]
pub struct WalletSetupArgs {
    /// Environment variable holding the hex private key
    #[arg(long, default_value = "FUNDING_ARB_PRIVATE_KEY")]
    pub key_env: String,

    /// Expected wallet address; setup fails if the key controls a different one
    #[arg(long)]
    pub address: Option<String>,

    /// Output path (defaults to `wallet.path`)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Store the encryption key inside the wallet file instead of the environment
    #[arg(long)]
    pub embed_key: bool,

    /// Overwrite an existing wallet file
    #[arg(long)]
    pub force: bool,
}

/// Runs the wallet-setup command.
///
/// # Errors
/// Returns an error if the key is missing or invalid, the address does not match, or the file
/// cannot be written.
pub fn run_wallet_setup(config: &AppConfig, args: &WalletSetupArgs) -> Result<()> {
    let path = args.output.as_deref().unwrap_or(&config.wallet.path);
    if Path::new(path).exists() && !args.force {
        bail!("{path} already exists; pass --force to overwrite");
    }

    let private_key = std::env::var(&args.key_env)
        .map(SecretString::from)
        .with_context(|| format!("Set {} to the wallet private key", args.key_env))?;

    let cipher = KeyCipher::generate();
    let signer = match &args.address {
        Some(address) => WalletSigner::connect(address, &private_key, cipher)?,
        None => WalletSigner::from_private_key(&private_key, cipher)?,
    };

    let file = signer.to_file(args.embed_key);
    file.save(path)?;
    tracing::info!(address = %signer.address(), path, "Wallet file written");

    println!("Wallet {} saved to {path}", signer.address());
    if !args.embed_key {
        if let Some(key) = signer.to_file(true).encryption_key {
            let key = SecretString::from(key);
            println!("Export the encryption key before running in live mode:");
            println!("  export {}={}", config.wallet.encryption_key_env, key.expose_secret());
        }
    }

    Ok(())
}
