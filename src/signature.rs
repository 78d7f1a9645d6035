use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";

/// Requests older (or newer) than this are treated as replays.
pub const MAX_CLOCK_SKEW_SECS: u64 = 300;

const SIGNATURE_VERSION: &str = "v0";
const DIGEST_HEX_LEN: usize = 64;

/// Case-insensitive read access to request headers, whatever the transport.
pub trait HeaderSource {
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|h| h.to_str().ok())
    }
}

impl<S: BuildHasher> HeaderSource for HashMap<String, String, S> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl HeaderSource for [(&str, &str)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

impl<const N: usize> HeaderSource for [(&str, &str); N] {
    fn header(&self, name: &str) -> Option<&str> {
        self.as_slice().header(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationError {
    MissingTimestamp,
    MissingSignature,
    InvalidTimestamp,
    StaleTimestamp,
    MalformedSignature,
    SignatureMismatch,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationError::MissingTimestamp => write!(f, "missing {} header", TIMESTAMP_HEADER),
            VerificationError::MissingSignature => write!(f, "missing {} header", SIGNATURE_HEADER),
            VerificationError::InvalidTimestamp => write!(f, "request timestamp is not a number"),
            VerificationError::StaleTimestamp => {
                write!(f, "request timestamp outside {}s window", MAX_CLOCK_SKEW_SECS)
            }
            VerificationError::MalformedSignature => write!(f, "signature is not v0=<hex digest>"),
            VerificationError::SignatureMismatch => write!(f, "signature does not match body"),
        }
    }
}

impl std::error::Error for VerificationError {}

/// Checks Slack request signatures against the app's signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    signing_secret: Vec<u8>,
}

impl SignatureVerifier {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            signing_secret: credentials.signing_secret().to_vec(),
        }
    }

    /// Returns `true` only for a fresh request whose signature matches the raw body.
    ///
    /// The body must be the exact bytes received; re-serialized JSON will not verify.
    pub fn verify<H>(&self, headers: &H, raw_body: &[u8]) -> bool
    where
        H: HeaderSource + ?Sized,
    {
        match self.check(headers, raw_body) {
            Ok(()) => true,
            Err(e) => {
                warn!("Signature verification failed: {}", e);
                false
            }
        }
    }

    pub fn check<H>(&self, headers: &H, raw_body: &[u8]) -> Result<(), VerificationError>
    where
        H: HeaderSource + ?Sized,
    {
        self.check_at(headers, raw_body, unix_now())
    }

    /// Same as [`check`](Self::check) against an explicit clock, in seconds since the epoch.
    pub fn check_at<H>(
        &self,
        headers: &H,
        raw_body: &[u8],
        now_secs: u64,
    ) -> Result<(), VerificationError>
    where
        H: HeaderSource + ?Sized,
    {
        let timestamp = headers
            .header(TIMESTAMP_HEADER)
            .ok_or(VerificationError::MissingTimestamp)?;
        let signature = headers
            .header(SIGNATURE_HEADER)
            .ok_or(VerificationError::MissingSignature)?;

        let ts: u64 = timestamp
            .parse()
            .map_err(|_| VerificationError::InvalidTimestamp)?;

        if now_secs.abs_diff(ts) > MAX_CLOCK_SKEW_SECS {
            return Err(VerificationError::StaleTimestamp);
        }

        let supplied = decode_signature(signature)?;

        // verify_slice compares in constant time
        signed_mac(&self.signing_secret, timestamp, raw_body)
            .verify_slice(&supplied)
            .map_err(|_| VerificationError::SignatureMismatch)
    }
}

/// Computes the `v0=<hex>` signature Slack would send for this timestamp and body.
pub fn compute_signature(signing_secret: &[u8], timestamp: &str, raw_body: &[u8]) -> String {
    let digest = signed_mac(signing_secret, timestamp, raw_body)
        .finalize()
        .into_bytes();
    format!("{}={}", SIGNATURE_VERSION, hex::encode(digest))
}

/// HMAC over `v0:<timestamp>:<body>`.
fn signed_mac(signing_secret: &[u8], timestamp: &str, raw_body: &[u8]) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(signing_secret)
        .expect("HMAC accepts keys of any length");
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
    mac
}

fn decode_signature(signature: &str) -> Result<Vec<u8>, VerificationError> {
    let digest = signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or(VerificationError::MalformedSignature)?;

    let lowercase_hex = digest
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if digest.len() != DIGEST_HEX_LEN || !lowercase_hex {
        return Err(VerificationError::MalformedSignature);
    }

    hex::decode(digest).map_err(|_| VerificationError::MalformedSignature)
}

pub(crate) fn unix_now() -> u64 {
    // A clock before 1970 makes every request stale, which is the safe outcome
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
