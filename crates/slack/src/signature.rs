//! Slack request signing (`v0=` HMAC-SHA256).
//!
//! Slack signs every Events API delivery over the ASCII basestring
//! `v0:{timestamp}:{body}`. Requests older (or newer) than the freshness
//! window are rejected before any MAC work to close the replay hole.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Replay window Slack documents for Events API requests.
pub const FRESHNESS_WINDOW_SECS: i64 = 300;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing request timestamp header")]
    MissingTimestamp,
    #[error("missing request signature header")]
    MissingSignature,
    #[error("request timestamp is not a unix epoch value: `{0}`")]
    InvalidTimestamp(String),
    #[error("request timestamp outside the {FRESHNESS_WINDOW_SECS}s freshness window")]
    StaleTimestamp,
    #[error("request signature does not match")]
    Mismatch,
}

pub struct SignatureVerifier {
    signing_secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString) -> Self {
        Self { signing_secret }
    }

    /// Verify a request against its timestamp and signature headers.
    ///
    /// `now_epoch_secs` is injected so the freshness check is testable;
    /// callers pass wall-clock seconds. Pure aside from that input.
    pub fn verify(
        &self,
        timestamp_header: Option<&str>,
        signature_header: Option<&str>,
        body: &[u8],
        now_epoch_secs: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp_header.ok_or(SignatureError::MissingTimestamp)?;
        let signature = signature_header.ok_or(SignatureError::MissingSignature)?;

        let timestamp_value: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        if (now_epoch_secs - timestamp_value).abs() > FRESHNESS_WINDOW_SECS {
            return Err(SignatureError::StaleTimestamp);
        }

        // Mac::verify_slice gives constant-time comparison over the raw MAC.
        let supplied_mac = signature
            .strip_prefix("v0=")
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
            .ok_or(SignatureError::Mismatch)?;

        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(basestring(timestamp, body).as_bytes());
        mac.verify_slice(&supplied_mac).map_err(|_| SignatureError::Mismatch)
    }
}

fn basestring(timestamp: &str, body: &[u8]) -> String {
    format!("v0:{}:{}", timestamp, String::from_utf8_lossy(body))
}

/// Produce the `v0=<hex>` signature Slack would send for this request.
pub fn sign(signing_secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(basestring(timestamp, body).as_bytes());
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}
