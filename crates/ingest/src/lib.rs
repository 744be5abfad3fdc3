//! Inbound webhook validation.
//!
//! For every receiver type a parser answers three questions about an HTTP
//! request: is it authentic for the receiver's token, is its event indicator
//! accepted, and what JSON payload does it expose to the resource filter.
//! Dispatch is a static table; no parser state survives a request.

mod bitbucket;
mod cdevents;
mod gcr;
mod generic;
mod github;
mod gitlab;
mod harbor;
mod nexus;
mod registry;
mod signature;

pub use signature::HmacAlg;

use axum::http::{HeaderMap, StatusCode};
use beacon_api::ReceiverType;
use serde_json::Value;
use thiserror::Error;

/// Rejection of an inbound webhook. Maps onto the gateway's response codes.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Signature missing, malformed or not matching the body.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Token-based credential missing or wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Body failed the type's shape check or is not parseable.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The event indicator is not in the receiver's accepted list.
    #[error("event {0:?} not accepted by this receiver")]
    EventRejected(String),
}

impl IngestError {
    /// The HTTP status the gateway answers with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidSignature(_) | Self::InvalidPayload(_) | Self::EventRejected(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

/// A validated webhook: the payload exposed as `req` to resource filters,
/// plus the event indicator where the type defines one.
#[derive(Debug, Clone)]
pub struct ParsedWebhook {
    pub payload: Value,
    pub event: Option<String>,
}

/// Validate a request for a receiver and return its parsed payload.
///
/// `token` is the value of the receiver secret's `token` key. When
/// `allowed_events` is set and the type carries an event header, a request
/// whose indicator is not listed (case-insensitive) is rejected.
pub fn parse_request(
    type_: ReceiverType,
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
    allowed_events: Option<&[String]>,
) -> Result<ParsedWebhook, IngestError> {
    let parsed = match type_ {
        ReceiverType::Generic => generic::parse(body),
        ReceiverType::GenericHmac => generic::parse_hmac(headers, body, token),
        ReceiverType::GitHub => github::parse(headers, body, token),
        ReceiverType::GitLab => gitlab::parse(headers, body, token),
        ReceiverType::Bitbucket => bitbucket::parse(headers, body, token),
        ReceiverType::Harbor => harbor::parse(headers, body, token),
        ReceiverType::DockerHub => registry::parse_dockerhub(body),
        ReceiverType::Quay => registry::parse_quay(body),
        ReceiverType::Acr => registry::parse_acr(body),
        ReceiverType::Gcr => gcr::parse(headers, body),
        ReceiverType::Nexus => nexus::parse(headers, body, token),
        ReceiverType::CdEvents => cdevents::parse(headers, body, token),
    }?;

    if let (Some(allowed), Some(event)) = (allowed_events, parsed.event.as_deref()) {
        let accepted = allowed.iter().any(|e| e.eq_ignore_ascii_case(event));
        if !accepted {
            return Err(IngestError::EventRejected(event.to_string()));
        }
    }

    Ok(parsed)
}

/// Read a header as a string, treating non-UTF-8 values as absent.
pub(crate) fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse the body as JSON, falling back to an empty map for types that
/// historically accept any content.
pub(crate) fn lenient_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

/// Parse the body as JSON, rejecting anything else.
pub(crate) fn strict_json(body: &[u8]) -> Result<Value, IngestError> {
    serde_json::from_slice(body)
        .map_err(|e| IngestError::InvalidPayload(format!("body is not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn hmac_sha256(token: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(token.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn event_list_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        let body = br#"{"ref":"refs/heads/main"}"#;
        headers.insert(
            "X-Hub-Signature-256",
            HeaderValue::from_str(&format!("sha256={}", hmac_sha256("t", body))).unwrap(),
        );
        headers.insert("X-GitHub-Event", HeaderValue::from_static("Push"));

        let allowed = vec!["push".to_string()];
        let parsed =
            parse_request(ReceiverType::GitHub, &headers, body, "t", Some(&allowed)).unwrap();
        assert_eq!(parsed.event.as_deref(), Some("Push"));
    }

    #[test]
    fn unlisted_event_rejected_with_bad_request() {
        let mut headers = HeaderMap::new();
        let body = br#"{"zen":"ok"}"#;
        headers.insert(
            "X-Hub-Signature-256",
            HeaderValue::from_str(&format!("sha256={}", hmac_sha256("t", body))).unwrap(),
        );
        headers.insert("X-GitHub-Event", HeaderValue::from_static("ping"));

        let allowed = vec!["push".to_string()];
        let err = parse_request(ReceiverType::GitHub, &headers, body, "t", Some(&allowed))
            .unwrap_err();
        assert!(matches!(err, IngestError::EventRejected(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn types_without_event_header_ignore_the_list() {
        let allowed = vec!["push".to_string()];
        let parsed = parse_request(
            ReceiverType::Generic,
            &HeaderMap::new(),
            br#"{"k":"v"}"#,
            "t",
            Some(&allowed),
        )
        .unwrap();
        assert!(parsed.event.is_none());
        assert_eq!(parsed.payload["k"], "v");
    }
}
