//! Encrypted configuration scalars.
//!
//! Any string value that starts with [`SIGIL`] is ciphertext; every other
//! string is cleartext. Ciphertext is `SIGIL` followed by the base64 of
//! `nonce || ciphertext || tag`, sealed with ChaCha20-Poly1305 under a key
//! derived from the user-supplied passphrase with BLAKE3.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Prefix marking an encrypted scalar.
pub const SIGIL: &str = "$BEEHIVE_VAULT;";

/// Size of the derived key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

const KDF_CONTEXT: &str = "beehive config vault v1";

/// Symmetric key used to open configuration secrets.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    bytes: [u8; KEY_SIZE],
}

impl VaultKey {
    /// Derive a key from a user passphrase.
    #[must_use]
    pub fn derive(passphrase: &str) -> Self {
        Self {
            bytes: blake3::derive_key(KDF_CONTEXT, passphrase.as_bytes()),
        }
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Whether a scalar is marked as ciphertext.
#[must_use]
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(SIGIL)
}

/// Encrypt a cleartext scalar into its sigil-prefixed form.
pub fn encrypt(key: &VaultKey, plaintext: &str) -> Result<String, String> {
    let cipher = ChaCha20Poly1305::new_from_slice(&key.bytes)
        .map_err(|e| format!("failed to create cipher: {e}"))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| format!("encryption failed: {e}"))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);

    Ok(format!("{SIGIL}{}", STANDARD.encode(out)))
}

/// Decrypt a sigil-prefixed scalar.
///
/// Values without the sigil are returned unchanged.
pub fn decrypt(key: &VaultKey, value: &str) -> Result<String, String> {
    let Some(encoded) = value.strip_prefix(SIGIL) else {
        return Ok(value.to_string());
    };

    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;

    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(format!(
            "ciphertext too short: expected at least {} bytes, got {}",
            NONCE_SIZE + TAG_SIZE,
            raw.len()
        ));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(&key.bytes)
        .map_err(|e| format!("failed to create cipher: {e}"))?;
    let (nonce_bytes, sealed) = raw.split_at(NONCE_SIZE);

    let plain = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| "authentication failed (wrong key or tampered value)".to_string())?;

    String::from_utf8(plain).map_err(|e| format!("decrypted value is not UTF-8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let key = VaultKey::derive("passphrase");
        let sealed = encrypt(&key, "s3cret").unwrap();
        assert!(is_encrypted(&sealed));
        assert!(!sealed.contains("s3cret"));
        assert_eq!(decrypt(&key, &sealed).unwrap(), "s3cret");
    }

    #[test]
    fn test_cleartext_passes_through() {
        let key = VaultKey::derive("passphrase");
        assert_eq!(decrypt(&key, "plain").unwrap(), "plain");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&VaultKey::derive("right"), "value").unwrap();
        let err = decrypt(&VaultKey::derive("wrong"), &sealed).unwrap_err();
        assert!(err.contains("authentication failed"));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = VaultKey::derive("k");
        let short = format!("{SIGIL}{}", STANDARD.encode([0u8; 8]));
        assert!(decrypt(&key, &short).unwrap_err().contains("too short"));
        assert!(decrypt(&key, &format!("{SIGIL}not base64!")).is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = VaultKey::derive("k");
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
