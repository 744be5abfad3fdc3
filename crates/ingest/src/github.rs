//! Parser for GitHub webhooks.

use axum::http::HeaderMap;

use crate::signature::{self, HmacAlg};
use crate::{header, strict_json, IngestError, ParsedWebhook};

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const EVENT_HEADER: &str = "X-GitHub-Event";

/// GitHub signs the raw body with HMAC-SHA256 and announces the event kind
/// in `X-GitHub-Event`.
pub(crate) fn parse(
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
) -> Result<ParsedWebhook, IngestError> {
    let value = header(headers, SIGNATURE_HEADER).ok_or_else(|| {
        IngestError::InvalidSignature(format!("missing {SIGNATURE_HEADER} header"))
    })?;
    let (alg, digest) = signature::parse_header(value)?;
    if alg != HmacAlg::Sha256 {
        return Err(IngestError::InvalidSignature(
            "GitHub signatures must use sha256".to_string(),
        ));
    }
    signature::verify(alg, token, body, &digest)?;

    Ok(ParsedWebhook {
        payload: strict_json(body)?,
        event: header(headers, EVENT_HEADER).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::compute;
    use axum::http::HeaderValue;

    fn signed_headers(token: &str, body: &[u8], event: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let sig = format!("sha256={}", hex::encode(compute(HmacAlg::Sha256, token, body)));
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        headers.insert(EVENT_HEADER, HeaderValue::from_str(event).unwrap());
        headers
    }

    #[test]
    fn valid_push_event() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let headers = signed_headers("t", body, "push");
        let parsed = parse(&headers, body, "t").unwrap();
        assert_eq!(parsed.event.as_deref(), Some("push"));
        assert_eq!(parsed.payload["ref"], "refs/heads/main");
    }

    #[test]
    fn sha1_signature_rejected() {
        let body = b"{}";
        let sig = format!("sha1={}", hex::encode(compute(HmacAlg::Sha1, "t", body)));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        assert!(parse(&headers, body, "t").is_err());
    }

    #[test]
    fn non_json_body_rejected() {
        let body = b"not json";
        let headers = signed_headers("t", body, "push");
        let err = parse(&headers, body, "t").unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload(_)));
    }
}
