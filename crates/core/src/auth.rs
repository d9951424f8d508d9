//! Legacy signed admin token verification.
//!
//! The token is the passcode-era admin cookie: `kind.subject.issued_at.sig`
//! where `sig` is HMAC-SHA256 over the first three fields. Verification fails
//! closed; any malformed, mis-signed, or expired token resolves to no claims.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionClaims {
    pub kind: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TokenVerifier {
    signing_key: Vec<u8>,
    max_age_secs: i64,
}

impl TokenVerifier {
    pub fn new(signing_key: impl AsRef<[u8]>, max_age_secs: i64) -> Self {
        Self { signing_key: signing_key.as_ref().to_vec(), max_age_secs }
    }

    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<SessionClaims> {
        let mut parts = token.split('.');
        let kind = parts.next()?;
        let subject = parts.next()?;
        let issued_at_raw = parts.next()?;
        let signature = parts.next()?;
        if parts.next().is_some() || kind.is_empty() || subject.is_empty() {
            return None;
        }

        let payload = format!("{kind}.{subject}.{issued_at_raw}");
        if hmac_hex(&self.signing_key, payload.as_bytes()) != signature {
            return None;
        }

        let issued_at_secs = issued_at_raw.parse::<i64>().ok()?;
        let issued_at = Utc.timestamp_opt(issued_at_secs, 0).single()?;
        let age_secs = (now - issued_at).num_seconds();
        if age_secs < 0 || age_secs > self.max_age_secs {
            return None;
        }

        Some(SessionClaims {
            kind: kind.to_string(),
            subject: subject.to_string(),
            issued_at,
        })
    }

    /// Mint a token. Used by the passcode login flow and by tests.
    pub fn sign(&self, kind: &str, subject: &str, issued_at: DateTime<Utc>) -> String {
        let payload = format!("{kind}.{subject}.{}", issued_at.timestamp());
        let signature = hmac_hex(&self.signing_key, payload.as_bytes());
        format!("{payload}.{signature}")
    }
}

fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
