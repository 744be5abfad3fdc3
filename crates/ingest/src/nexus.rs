//! Parser for Sonatype Nexus webhooks.

use axum::http::HeaderMap;

use crate::signature::{self, HmacAlg};
use crate::{header, strict_json, IngestError, ParsedWebhook};

const SIGNATURE_HEADER: &str = "X-Nexus-Webhook-Signature";

/// Nexus signs the raw body with HMAC-SHA1 and sends the bare hex digest.
pub(crate) fn parse(
    headers: &HeaderMap,
    body: &[u8],
    token: &str,
) -> Result<ParsedWebhook, IngestError> {
    let value = header(headers, SIGNATURE_HEADER).ok_or_else(|| {
        IngestError::InvalidSignature(format!("missing {SIGNATURE_HEADER} header"))
    })?;
    let digest = hex::decode(value)
        .map_err(|_| IngestError::InvalidSignature("signature is not valid hex".to_string()))?;
    signature::verify(HmacAlg::Sha1, token, body, &digest)?;

    Ok(ParsedWebhook {
        payload: strict_json(body)?,
        event: None,
    })
}
