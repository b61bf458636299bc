//! Keyauth request signing.
//!
//! Every signed request carries four headers: the session token, a UNIX
//! timestamp, a random 128-bit nonce and an HMAC-SHA256 signature over
//! `method\npath\ntimestamp\nnonce` keyed by the session seckey.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

pub const HEADER_TOKEN: &str = "X-Auth-Token";
pub const HEADER_TIMESTAMP: &str = "X-Auth-Timestamp";
pub const HEADER_NONCE: &str = "X-Auth-Nonce";
pub const HEADER_SIGNATURE: &str = "X-Auth-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Produces signature headers with strictly non-decreasing timestamps.
#[derive(Debug, Default)]
pub struct Signer {
    last_timestamp: u64,
}

impl Signer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current timestamp, never lower than the previous one handed out.
    pub fn timestamp(&mut self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        self.last_timestamp = self.last_timestamp.max(now);
        self.last_timestamp
    }

    /// Headers authenticating a request for `method path`.
    pub fn headers(
        &mut self,
        token: &str,
        seckey: &str,
        method: &str,
        path: &str,
    ) -> Vec<(String, String)> {
        let timestamp = self.timestamp().to_string();
        let nonce = nonce();
        let signature = sign(seckey, method, path, &timestamp, &nonce);
        vec![
            (HEADER_TOKEN.to_string(), token.to_string()),
            (HEADER_TIMESTAMP.to_string(), timestamp),
            (HEADER_NONCE.to_string(), nonce),
            (HEADER_SIGNATURE.to_string(), signature),
        ]
    }
}

/// Random 128-bit nonce, lower-case hex.
pub fn nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Base64 HMAC-SHA256 signature of a request.
pub fn sign(seckey: &str, method: &str, path: &str, timestamp: &str, nonce: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(seckey.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(format!("{method}\n{path}\n{timestamp}\n{nonce}").as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}
