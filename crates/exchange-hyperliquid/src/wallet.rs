//! Trading wallet with the private key encrypted at rest.
//!
//! - The key is stored AES-256-GCM encrypted (`base64(nonce || ciphertext)`).
//! - The address is checked against the key at construction; a wallet whose address does not
//!   match its key cannot be built.
//! - Plaintext key bytes only exist in `Zeroizing` buffers for the duration of one signature.
//! - `Debug` shows the address only. Keys are never logged.

use crate::models::SignatureWire;
use crate::signing::{sign_action, signature_to_wire};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use funding_arb_core::config::WalletConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet address {expected} does not match key address {derived}")]
    AddressMismatch { expected: String, derived: String },

    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    /// The message never contains key material.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("no encryption key in wallet file and environment variable {0} is not set")]
    MissingEncryptionKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid wallet file: {0}")]
    Parse(#[from] serde_json::Error),
}

// =============================================================================
// KeyCipher
// =============================================================================

/// Symmetric cipher for the private key at rest.
pub struct KeyCipher {
    key: Zeroizing<Vec<u8>>,
}

impl KeyCipher {
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            key: Zeroizing::new(key.to_vec()),
        }
    }

    /// # Errors
    ///
    /// Returns [`WalletError::Decryption`] if the key is not base64 of 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, WalletError> {
        let key = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| WalletError::Decryption(format!("encryption key is not base64: {e}")))?,
        );
        if key.len() != KEY_LEN {
            return Err(WalletError::Decryption(format!(
                "encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self { key })
    }

    #[must_use]
    pub fn to_base64(&self) -> SecretString {
        SecretString::from(STANDARD.encode(self.key.as_slice()))
    }

    /// # Errors
    ///
    /// Returns [`WalletError::Encryption`] if the cipher fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, WalletError> {
        let cipher = self.cipher().map_err(WalletError::Encryption)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| WalletError::Encryption(e.to_string()))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(token))
    }

    /// # Errors
    ///
    /// Returns [`WalletError::Decryption`] on a malformed token or the wrong key.
    pub fn decrypt(&self, token: &str) -> Result<Zeroizing<Vec<u8>>, WalletError> {
        let raw = STANDARD
            .decode(token.trim())
            .map_err(|e| WalletError::Decryption(format!("ciphertext is not base64: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(WalletError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let cipher = self.cipher().map_err(WalletError::Decryption)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| WalletError::Decryption("wrong key or corrupted ciphertext".to_string()))
    }

    fn cipher(&self) -> Result<Aes256Gcm, String> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| e.to_string())
    }
}

impl fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCipher").finish_non_exhaustive()
    }
}

// =============================================================================
// WalletSigner
// =============================================================================

pub struct WalletSigner {
    address: String,
    encrypted_key: String,
    cipher: KeyCipher,
    last_nonce: AtomicU64,
}

impl WalletSigner {
    /// Builds a signer for `address`, verifying that `private_key` controls it.
    ///
    /// # Errors
    ///
    /// - [`WalletError::InvalidAddress`] if `address` is not `0x` followed by 40 hex digits
    /// - [`WalletError::InvalidPrivateKey`] if the key cannot be parsed
    /// - [`WalletError::AddressMismatch`] if the key derives a different address
    pub fn connect(
        address: &str,
        private_key: &SecretString,
        cipher: KeyCipher,
    ) -> Result<Self, WalletError> {
        validate_address(address)?;
        let key = decode_private_key(private_key.expose_secret())?;
        let derived = derive_address(&key)?;
        ensure_same_address(address, &derived)?;

        let encrypted_key = cipher.encrypt(&key)?;
        Ok(Self {
            address: derived,
            encrypted_key,
            cipher,
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Builds a signer for whatever address `private_key` controls.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::InvalidPrivateKey`] if the key cannot be parsed.
    pub fn from_private_key(private_key: &SecretString, cipher: KeyCipher) -> Result<Self, WalletError> {
        let key = decode_private_key(private_key.expose_secret())?;
        let address = derive_address(&key)?;
        let encrypted_key = cipher.encrypt(&key)?;
        Ok(Self {
            address,
            encrypted_key,
            cipher,
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Restores a signer from its encrypted key, re-checking the address.
    ///
    /// # Errors
    ///
    /// Returns an error if decryption fails or the key does not control `address`.
    pub fn from_encrypted(
        address: &str,
        encrypted_key: &str,
        cipher: KeyCipher,
    ) -> Result<Self, WalletError> {
        validate_address(address)?;
        let key = cipher.decrypt(encrypted_key)?;
        let derived = derive_address(&key)?;
        ensure_same_address(address, &derived)?;

        Ok(Self {
            address: derived,
            encrypted_key: encrypted_key.to_string(),
            cipher,
            last_nonce: AtomicU64::new(0),
        })
    }

    /// Checksummed address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wallet file contents. The encryption key is embedded only when `embed_key` is set;
    /// otherwise it must be supplied through the environment when loading.
    #[must_use]
    pub fn to_file(&self, embed_key: bool) -> WalletFile {
        WalletFile {
            address: self.address.clone(),
            encrypted_private_key: self.encrypted_key.clone(),
            encryption_key: embed_key.then(|| self.cipher.to_base64().expose_secret().to_string()),
        }
    }

    /// Millisecond timestamp, strictly greater than any nonce handed out before.
    pub fn next_nonce(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let previous = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Signs an exchange action with `nonce`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be decrypted or signing fails.
    pub async fn sign(
        &self,
        action: &serde_json::Value,
        nonce: u64,
    ) -> Result<SignatureWire, WalletError> {
        let wallet = self.local_wallet()?;
        let signature = sign_action(&wallet, action, nonce)
            .await
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(signature_to_wire(&signature))
    }

    fn local_wallet(&self) -> Result<LocalWallet, WalletError> {
        let key = self.cipher.decrypt(&self.encrypted_key)?;
        LocalWallet::from_bytes(&key).map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))
    }
}

impl fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Wallet file
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletFile {
    pub address: String,
    pub encrypted_private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

impl WalletFile {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a wallet file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes the file, readable by the owner only on Unix.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WalletError> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// The embedded encryption key, else the one in environment variable `env_var`.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::MissingEncryptionKey`] if neither exists.
    pub fn cipher(&self, env_var: &str) -> Result<KeyCipher, WalletError> {
        if let Some(key) = &self.encryption_key {
            return KeyCipher::from_base64(key);
        }
        match std::env::var(env_var) {
            Ok(key) if !key.trim().is_empty() => KeyCipher::from_base64(&key),
            _ => Err(WalletError::MissingEncryptionKey(env_var.to_string())),
        }
    }
}

/// Loads and verifies the wallet described by `config`.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, no encryption key is available, or the
/// key does not control the recorded address.
pub fn load_signer(config: &WalletConfig) -> Result<WalletSigner, WalletError> {
    let file = WalletFile::load(&config.path)?;
    let cipher = file.cipher(&config.encryption_key_env)?;
    let signer = WalletSigner::from_encrypted(&file.address, &file.encrypted_private_key, cipher)?;
    info!(address = %signer.address(), path = %config.path, "Wallet loaded");
    Ok(signer)
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_address(address: &str) -> Result<(), WalletError> {
    let valid = address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(WalletError::InvalidAddress(address.to_string()))
    }
}

fn decode_private_key(private_key: &str) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    let trimmed = private_key.trim();
    let hex_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(hex_key)
            .map_err(|_| WalletError::InvalidPrivateKey("expected 64 hex characters".to_string()))?,
    );
    if bytes.len() != KEY_LEN {
        return Err(WalletError::InvalidPrivateKey(format!(
            "expected {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn derive_address(key: &[u8]) -> Result<String, WalletError> {
    let wallet =
        LocalWallet::from_bytes(key).map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;
    Ok(to_checksum(&wallet.address(), None))
}

fn ensure_same_address(expected: &str, derived: &str) -> Result<(), WalletError> {
    if expected.eq_ignore_ascii_case(derived) {
        Ok(())
    } else {
        Err(WalletError::AddressMismatch {
            expected: expected.to_string(),
            derived: derived.to_string(),
        })
    }
}
