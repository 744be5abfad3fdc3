//! Shape-check parsers for container registries without credentials:
//! Docker Hub, Quay and Azure Container Registry.

use serde_json::Value;

use crate::{strict_json, IngestError, ParsedWebhook};

/// Docker Hub pushes `{"push_data": {...}, "repository": {...}}`.
pub(crate) fn parse_dockerhub(body: &[u8]) -> Result<ParsedWebhook, IngestError> {
    let payload = strict_json(body)?;
    require_object(&payload, "push_data")?;
    require_object(&payload, "repository")?;
    Ok(ParsedWebhook {
        payload,
        event: None,
    })
}

/// Quay pushes `{"docker_url": ..., "updated_tags": [...]}`.
pub(crate) fn parse_quay(body: &[u8]) -> Result<ParsedWebhook, IngestError> {
    let payload = strict_json(body)?;
    if payload.get("docker_url").and_then(Value::as_str).is_none() {
        return Err(IngestError::InvalidPayload(
            "missing docker_url field".to_string(),
        ));
    }
    match payload.get("updated_tags") {
        Some(Value::Array(tags)) if !tags.is_empty() => {}
        _ => {
            return Err(IngestError::InvalidPayload(
                "missing or empty updated_tags field".to_string(),
            ))
        }
    }
    Ok(ParsedWebhook {
        payload,
        event: None,
    })
}

/// ACR pushes `{"action": ..., "target": {"repository": ...}}`.
pub(crate) fn parse_acr(body: &[u8]) -> Result<ParsedWebhook, IngestError> {
    let payload = strict_json(body)?;
    if payload
        .get("target")
        .and_then(|t| t.get("repository"))
        .and_then(Value::as_str)
        .is_none()
    {
        return Err(IngestError::InvalidPayload(
            "missing target.repository field".to_string(),
        ));
    }
    Ok(ParsedWebhook {
        payload,
        event: None,
    })
}

fn require_object(payload: &Value, field: &str) -> Result<(), IngestError> {
    match payload.get(field) {
        Some(Value::Object(_)) => Ok(()),
        _ => Err(IngestError::InvalidPayload(format!(
            "missing {field} object"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockerhub_shape() {
        let ok = br#"{"push_data":{"tag":"v1"},"repository":{"repo_name":"app"}}"#;
        assert!(parse_dockerhub(ok).is_ok());
        assert!(parse_dockerhub(br#"{"repository":{}}"#).is_err());
        assert!(parse_dockerhub(b"[]").is_err());
    }

    #[test]
    fn quay_shape() {
        let ok = br#"{"docker_url":"quay.io/org/app","updated_tags":["v1"]}"#;
        assert!(parse_quay(ok).is_ok());
        assert!(parse_quay(br#"{"docker_url":"x","updated_tags":[]}"#).is_err());
        assert!(parse_quay(br#"{"updated_tags":["v1"]}"#).is_err());
    }

    #[test]
    fn acr_shape() {
        let ok = br#"{"action":"push","target":{"repository":"app","tag":"v1"}}"#;
        assert!(parse_acr(ok).is_ok());
        assert!(parse_acr(br#"{"action":"push"}"#).is_err());
    }
}
