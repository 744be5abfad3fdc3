//! Parser for Bitbucket Server webhooks.

use axum::http::HeaderMap;

use crate::signature;
use crate::{header, strict_json, IngestError, ParsedWebhook};

const SIGNATURE_HEADER: &str = "X-Hub-Signature";
const EVENT_HEADER: &str = "X-Event-Key";

/// Bitbucket Server signs the raw body and announces the event kind in
/// `X-Event-Key` (e.g. `repo:refs_changed`).
pub(crate) fn parse(
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
) -> Result<ParsedWebhook, IngestError> {
    let value = header(headers, SIGNATURE_HEADER).ok_or_else(|| {
        IngestError::InvalidSignature(format!("missing {SIGNATURE_HEADER} header"))
    })?;
    let (alg, digest) = signature::parse_header(value)?;
    signature::verify(alg, token, body, &digest)?;

    Ok(ParsedWebhook {
        payload: strict_json(body)?,
        event: header(headers, EVENT_HEADER).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{compute, HmacAlg};
    use axum::http::HeaderValue;

    #[test]
    fn accepts_sha256_signed_event() {
        let body = br#"{"eventKey":"repo:refs_changed"}"#;
        let sig = format!("sha256={}", hex::encode(compute(HmacAlg::Sha256, "t", body)));
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        headers.insert(EVENT_HEADER, HeaderValue::from_static("repo:refs_changed"));

        let parsed = parse(&headers, body, "t").unwrap();
        assert_eq!(parsed.event.as_deref(), Some("repo:refs_changed"));
    }

    #[test]
    fn missing_signature_rejected() {
        assert!(parse(&HeaderMap::new(), b"{}", "t").is_err());
    }
}
