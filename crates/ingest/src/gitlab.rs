//! Parser for GitLab webhooks.

use axum::http::HeaderMap;

use crate::signature::tokens_match;
use crate::{header, strict_json, IngestError, ParsedWebhook};

const TOKEN_HEADER: &str = "X-Gitlab-Token";
const EVENT_HEADER: &str = "X-Gitlab-Event";

/// GitLab sends the shared secret verbatim in `X-Gitlab-Token`.
pub(crate) fn parse(
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
) -> Result<ParsedWebhook, IngestError> {
    let presented = header(headers, TOKEN_HEADER)
        .ok_or_else(|| IngestError::Unauthorized(format!("missing {TOKEN_HEADER} header")))?;
    if !tokens_match(token, presented) {
        return Err(IngestError::Unauthorized("token mismatch".to_string()));
    }

    Ok(ParsedWebhook {
        payload: strict_json(body)?,
        event: header(headers, EVENT_HEADER).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn token_equality() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("t0k"));
        headers.insert(EVENT_HEADER, HeaderValue::from_static("Push Hook"));
        let parsed = parse(&headers, br#"{"a":1}"#, "t0k").unwrap();
        assert_eq!(parsed.event.as_deref(), Some("Push Hook"));
    }

    #[test]
    fn wrong_token_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("wrong"));
        let err = parse(&headers, b"{}", "t0k").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let err = parse(&HeaderMap::new(), b"{}", "t0k").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
