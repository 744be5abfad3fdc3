//! Parser for Harbor registry webhooks.

use axum::http::HeaderMap;

use crate::signature::tokens_match;
use crate::{header, lenient_json, IngestError, ParsedWebhook};

/// Harbor sends the configured auth header value verbatim in
/// `Authorization`.
pub(crate) fn parse(
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
) -> Result<ParsedWebhook, IngestError> {
    let presented = header(headers, "Authorization")
        .ok_or_else(|| IngestError::Unauthorized("missing Authorization header".to_string()))?;
    if !tokens_match(token, presented) {
        return Err(IngestError::Unauthorized("token mismatch".to_string()));
    }

    Ok(ParsedWebhook {
        payload: lenient_json(body),
        event: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn authorization_equality() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("t0k"));
        let parsed = parse(&headers, br#"{"type":"PUSH_ARTIFACT"}"#, "t0k").unwrap();
        assert_eq!(parsed.payload["type"], "PUSH_ARTIFACT");
    }

    #[test]
    fn wrong_header_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("nope"));
        assert!(parse(&headers, b"{}", "t0k").is_err());
    }
}
