//! Parsers for the `generic` and `generic-hmac` receiver types.

use axum::http::HeaderMap;

use crate::signature;
use crate::{header, lenient_json, IngestError, ParsedWebhook};

/// `generic` carries no credentials; knowledge of the webhook path is the
/// capability. Any content-type is accepted; non-JSON bodies expose an
/// empty map to the resource filter.
pub(crate) fn parse(body: &[u8]) -> Result<ParsedWebhook, IngestError> {
    Ok(ParsedWebhook {
        payload: lenient_json(body),
        event: None,
    })
}

/// `generic-hmac` requires `X-Signature: <algo>=<hex>` over the raw body,
/// with algo one of sha1, sha256 or sha512.
pub(crate) fn parse_hmac(
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
) -> Result<ParsedWebhook, IngestError> {
    let value = header(headers, "X-Signature")
        .ok_or_else(|| IngestError::InvalidSignature("missing X-Signature header".to_string()))?;
    let (alg, digest) = signature::parse_header(value)?;
    signature::verify(alg, token, body, &digest)?;

    Ok(ParsedWebhook {
        payload: lenient_json(body),
        event: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{compute, HmacAlg};
    use axum::http::HeaderValue;

    #[test]
    fn generic_accepts_non_json() {
        let parsed = parse(b"plain text").unwrap();
        assert_eq!(parsed.payload, serde_json::json!({}));
    }

    #[test]
    fn hmac_round_trip() {
        let body = br#"{"k":"v"}"#;
        let sig = format!("sha256={}", hex::encode(compute(HmacAlg::Sha256, "s3cret", body)));
        let mut headers = HeaderMap::new();
        headers.insert("X-Signature", HeaderValue::from_str(&sig).unwrap());

        let parsed = parse_hmac(&headers, body, "s3cret").unwrap();
        assert_eq!(parsed.payload["k"], "v");
    }

    #[test]
    fn hmac_rejects_wrong_token_and_mutated_body() {
        let body = br#"{"k":"v"}"#;
        let sig = format!("sha256={}", hex::encode(compute(HmacAlg::Sha256, "s3cret", body)));
        let mut headers = HeaderMap::new();
        headers.insert("X-Signature", HeaderValue::from_str(&sig).unwrap());

        assert!(parse_hmac(&headers, body, "other").is_err());
        assert!(parse_hmac(&headers, br#"{"k":"w"}"#, "s3cret").is_err());
    }

    #[test]
    fn hmac_requires_header() {
        let err = parse_hmac(&HeaderMap::new(), b"{}", "t").unwrap_err();
        assert!(matches!(err, IngestError::InvalidSignature(_)));
    }
}
