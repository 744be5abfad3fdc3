//! The event payload accepted by the event router.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ObjectReference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of an informational event.
pub const SEVERITY_INFO: &str = "info";

/// Severity of an error event.
pub const SEVERITY_ERROR: &str = "error";

/// Upper bound on the event message length; longer messages are truncated
/// at ingestion.
pub const MAX_MESSAGE_LENGTH: usize = 39_000;

/// Metadata keys that never survive fan-out, compared against the key with
/// its group prefix stripped.
pub const SENTINEL_KEYS: [&str; 2] = ["checksum", "digest"];

/// A reconciliation-relevant state change reported by a platform controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// The object the event is about.
    pub involved_object: ObjectReference,

    /// `info` or `error`.
    pub severity: String,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Human-readable description of the state change.
    pub message: String,

    /// Machine-readable reason, e.g. `ReconciliationSucceeded`.
    pub reason: String,

    /// Controller-supplied metadata. Keys are expected to be prefixed with
    /// the involved object's API group; unprefixed keys are dropped before
    /// fan-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,

    /// Name of the controller that emitted the event.
    pub reporting_controller: String,

    /// Instance of the reporting controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_instance: Option<String>,
}

impl Event {
    /// The API group of the involved object (the part of `apiVersion`
    /// before `/`, empty for core objects).
    #[must_use]
    pub fn object_group(&self) -> &str {
        let api_version = self
            .involved_object
            .api_version
            .as_deref()
            .unwrap_or_default();
        api_version.split('/').next().unwrap_or_default()
    }

    /// Look up a metadata value by its group-prefixed key, e.g.
    /// `metadata_value("revision")` reads `<group>/revision`.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        let prefixed = format!("{}/{key}", self.object_group());
        self.metadata.as_ref()?.get(&prefixed).map(String::as_str)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == SEVERITY_ERROR
    }

    /// Coordinates of the involved object, defaulting missing parts to "".
    #[must_use]
    pub fn object_coordinates(&self) -> (&str, &str, &str) {
        (
            self.involved_object.kind.as_deref().unwrap_or_default(),
            self.involved_object
                .namespace
                .as_deref()
                .unwrap_or_default(),
            self.involved_object.name.as_deref().unwrap_or_default(),
        )
    }

    /// Prune metadata to keys carrying the involved object's group prefix,
    /// strip the prefix, and drop sentinel keys. Called on a clone of the
    /// event before decoration and dispatch.
    pub fn clean_metadata(&mut self) {
        let prefix = format!("{}/", self.object_group());
        if let Some(metadata) = self.metadata.take() {
            let cleaned: BTreeMap<String, String> = metadata
                .into_iter()
                .filter_map(|(k, v)| {
                    let stripped = k.strip_prefix(&prefix)?;
                    if stripped.is_empty() || SENTINEL_KEYS.contains(&stripped) {
                        return None;
                    }
                    Some((stripped.to_string(), v))
                })
                .collect();
            if !cleaned.is_empty() {
                self.metadata = Some(cleaned);
            }
        }
    }
}
