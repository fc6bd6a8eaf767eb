//! Stripe-style webhook signatures.
//!
//! Header format: `t=<unix>,v1=<hex>[,v1=<hex>...][,v0=...]`. The signature is
//! HMAC-SHA256 over `"{t}.{raw body}"` keyed with the endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Maximum distance between the signed timestamp and now, in either direction.
const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header: {0}")]
    Malformed(&'static str),
    #[error("timestamp outside tolerance")]
    StaleTimestamp,
    #[error("no matching signature")]
    Mismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut v1 = Vec::new();
        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or(SignatureError::Malformed("expected key=value"))?;
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| SignatureError::Malformed("bad timestamp"))?,
                    )
                }
                "v1" => {
                    // Undecodable entries cannot match; skip rather than fail the header.
                    if let Ok(sig) = hex::decode(value) {
                        v1.push(sig);
                    }
                }
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(SignatureError::Malformed("missing timestamp"))?;
        if v1.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature"));
        }
        Ok(Self { timestamp, v1 })
    }
}

pub struct WebhookVerifier<'a> {
    secret: &'a str,
}

impl<'a> WebhookVerifier<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { secret }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(header)?;
        if (now - header.timestamp).abs() > TOLERANCE_SECS {
            return Err(SignatureError::StaleTimestamp);
        }
        let expected = self.compute(header.timestamp, payload)?;
        let matched = header
            .v1
            .iter()
            .any(|sig| sig.len() == expected.len() && bool::from(sig.ct_eq(&expected)));
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Builds a valid header for `payload`, as the provider would.
#[cfg(test)]
pub fn sign_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let sig = WebhookVerifier::new(secret)
        .compute(timestamp, payload)
        .expect("hmac accepts any key");
    format!("t={timestamp},v1={}", hex::encode(sig))
}
