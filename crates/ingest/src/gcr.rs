//! Parser for Google Container Registry / Artifact Registry push
//! notifications, delivered as Pub/Sub push messages with a bearer JWT.

use axum::http::HeaderMap;
use base64::Engine;
use serde_json::Value;

use crate::{header, strict_json, IngestError, ParsedWebhook};

const ACCEPTED_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Pub/Sub push wraps the registry notification in
/// `{"message": {"data": <base64 JSON>}, "subscription": ...}` and
/// authenticates with an OIDC token whose issuer must be Google.
pub(crate) fn parse(headers: &HeaderMap, body: &[u8]) -> Result<ParsedWebhook, IngestError> {
    let authorization = header(headers, "Authorization")
        .ok_or_else(|| IngestError::Unauthorized("missing Authorization header".to_string()))?;
    let jwt = authorization
        .strip_prefix("Bearer ")
        .ok_or_else(|| IngestError::Unauthorized("expected a bearer token".to_string()))?;
    validate_issuer(jwt)?;

    let envelope = strict_json(body)?;
    let data = envelope
        .get("message")
        .and_then(|m| m.get("data"))
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::InvalidPayload("missing message.data field".to_string()))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|_| IngestError::InvalidPayload("message.data is not base64".to_string()))?;
    let payload = strict_json(&decoded)?;

    Ok(ParsedWebhook {
        payload,
        event: None,
    })
}

/// Decode the JWT claims (no signature verification here; the opaque
/// webhook path is the capability) and check the issuer.
fn validate_issuer(jwt: &str) -> Result<(), IngestError> {
    let claims_segment = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| IngestError::Unauthorized("malformed JWT".to_string()))?;
    let claims = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(claims_segment)
        .map_err(|_| IngestError::Unauthorized("malformed JWT claims".to_string()))?;
    let claims: Value = serde_json::from_slice(&claims)
        .map_err(|_| IngestError::Unauthorized("malformed JWT claims".to_string()))?;

    let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or("");
    if ACCEPTED_ISSUERS.contains(&issuer) {
        Ok(())
    } else {
        Err(IngestError::Unauthorized(format!(
            "unexpected token issuer {issuer:?}"
        )))
    }
}
