//! Parser for CDEvents webhooks.

use axum::http::HeaderMap;
use serde_json::Value;

use crate::signature::tokens_match;
use crate::{header, strict_json, IngestError, ParsedWebhook};

const EVENT_HEADER: &str = "Ce-Type";

/// CDEvents deliveries carry the event type in `Ce-Type` and optionally a
/// bearer token; when an Authorization header is present it must match.
pub(crate) fn parse(
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
) -> Result<ParsedWebhook, IngestError> {
    if let Some(authorization) = header(headers, "Authorization") {
        let presented = authorization
            .strip_prefix("Bearer ")
            .ok_or_else(|| IngestError::Unauthorized("expected a bearer token".to_string()))?;
        if !tokens_match(token, presented) {
            return Err(IngestError::Unauthorized("token mismatch".to_string()));
        }
    }

    let event = header(headers, EVENT_HEADER)
        .ok_or_else(|| IngestError::InvalidPayload(format!("missing {EVENT_HEADER} header")))?
        .to_string();

    let payload = strict_json(body)?;
    match payload.get("context") {
        Some(Value::Object(_)) => {}
        _ => {
            return Err(IngestError::InvalidPayload(
                "missing CDEvents context object".to_string(),
            ))
        }
    }

    Ok(ParsedWebhook {
        payload,
        event: Some(event),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn body() -> &'static [u8] {
        br#"{"context":{"type":"dev.cdevents.artifact.published.0.1.1"},"subject":{}}"#
    }

    #[test]
    fn bearer_optional_but_checked_when_present() {
        let mut headers = HeaderMap::new();
        headers.insert(
            EVENT_HEADER,
            HeaderValue::from_static("dev.cdevents.artifact.published.0.1.1"),
        );
        assert!(parse(&headers, body(), "t").is_ok());

        headers.insert("Authorization", HeaderValue::from_static("Bearer t"));
        assert!(parse(&headers, body(), "t").is_ok());

        headers.insert("Authorization", HeaderValue::from_static("Bearer wrong"));
        assert!(parse(&headers, body(), "t").is_err());
    }

    #[test]
    fn context_shape_required() {
        let mut headers = HeaderMap::new();
        headers.insert(EVENT_HEADER, HeaderValue::from_static("x"));
        assert!(parse(&headers, br#"{"subject":{}}"#, "t").is_err());
    }
}
