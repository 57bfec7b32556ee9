use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

#[derive(Debug, Deserialize)]
pub struct EventObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body. Any `v1` entry may match.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> AppResult<()> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
    let issued_at: i64 = timestamp.parse().map_err(|_| AppError::InvalidSignature)?;
    if (now - issued_at).abs() > tolerance_secs {
        return Err(AppError::InvalidSignature);
    }

    let matched = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

/// Verifies the signature, then decodes the event body.
pub fn construct_event(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> AppResult<StripeEvent> {
    verify_signature(payload, header, secret, tolerance_secs, now)?;
    serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(format!("invalid event payload: {e}")))
}

#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1","metadata":{"order_id":"abc"}}}}"#;

    #[test]
    fn accepts_valid_signature() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert!(verify_signature(BODY, &header, SECRET, 300, 1_700_000_100).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        let err = verify_signature(b"{}", &header, SECRET, 300, 1_700_000_000).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature));
    }

    #[test]
    fn rejects_wrong_secret_and_stale_timestamp() {
        let header = sign(BODY, "whsec_other", 1_700_000_000);
        assert!(verify_signature(BODY, &header, SECRET, 300, 1_700_000_000).is_err());

        let header = sign(BODY, SECRET, 1_700_000_000);
        assert!(verify_signature(BODY, &header, SECRET, 300, 1_700_000_301).is_err());
    }

    #[test]
    fn any_v1_entry_may_match() {
        let valid = sign(BODY, SECRET, 42);
        let v1 = valid.split_once(",v1=").map(|(_, v)| v).unwrap();
        let header = format!("t=42,v1=deadbeef,v1={v1},v0=ignored");
        assert!(verify_signature(BODY, &header, SECRET, 300, 42).is_ok());
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(verify_signature(BODY, "garbage", SECRET, 300, 0).is_err());
        assert!(verify_signature(BODY, "t=abc,v1=00", SECRET, 300, 0).is_err());
    }

    #[test]
    fn event_payload_decodes() {
        let header = sign(BODY, SECRET, 10);
        let event = construct_event(BODY, &header, SECRET, 300, 10).unwrap();
        assert_eq!(event.event_type, CHECKOUT_COMPLETED);
        assert_eq!(event.data.object.id, "cs_1");
        assert_eq!(event.data.object.metadata.get("order_id").map(String::as_str), Some("abc"));
    }
}
