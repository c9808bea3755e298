use crate::models::SignatureWire;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Signature, U256};
use serde_json::json;

/// The exact text that is signed for an action: compact JSON of `{"action", "nonce"}`.
///
/// # Errors
/// Returns error if the action cannot be serialized
pub fn action_message(action: &serde_json::Value, nonce: u64) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json!({
        "action": action,
        "nonce": nonce,
    }))
}

/// Sign an exchange action (EIP-191 personal message over [`action_message`])
///
/// # Errors
/// Returns error if serialization or signing fails
pub async fn sign_action(
    wallet: &LocalWallet,
    action: &serde_json::Value,
    nonce: u64,
) -> anyhow::Result<Signature> {
    let message = action_message(action, nonce)?;
    let signature = wallet.sign_message(message.as_bytes()).await?;
    Ok(signature)
}

/// Convert signature to the `{r, s, v}` form the exchange API expects
#[must_use]
pub fn signature_to_wire(signature: &Signature) -> SignatureWire {
    SignatureWire {
        r: u256_to_hex(signature.r),
        s: u256_to_hex(signature.s),
        v: signature.v,
    }
}

fn u256_to_hex(value: U256) -> String {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}
