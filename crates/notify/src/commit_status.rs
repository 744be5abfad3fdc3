//! Shared pieces of the commit-status subprotocol.
//!
//! Commit-status providers update a status on a source-control commit. The
//! status id must be stable across events for the same alert/provider pair
//! so the vendor collapses updates instead of accumulating them; adapters
//! additionally read the remote's current state and suppress writes that
//! would not change anything.

use beacon_api::Event;

use crate::payload;
use crate::NotifyError;

/// Derive the default status id: `<kind>/<name>/<first 8 chars of the
/// provider UID>`, lowercased.
#[must_use]
pub fn default_id(event: &Event, provider_uid: &str) -> String {
    let (kind, _, name) = event.object_coordinates();
    let uid_prefix: String = provider_uid.chars().take(8).collect();
    format!("{kind}/{name}/{uid_prefix}").to_lowercase()
}

/// The desired remote state for one event, vendor-neutral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Stable status id (vendor "context", "name" or "key").
    pub id: String,
    /// Bare commit SHA.
    pub sha: String,
    /// Whether the pipeline outcome was a success.
    pub success: bool,
    /// Short human-readable description.
    pub description: String,
}

impl StatusUpdate {
    /// Build the update for an event, requiring revision metadata.
    pub fn from_event(event: &Event, id: String) -> Result<Self, NotifyError> {
        let revision = payload::revision(event).ok_or_else(|| {
            NotifyError::Config("event carries no revision metadata".to_string())
        })?;
        Ok(Self {
            id,
            sha: payload::revision_sha(revision).to_string(),
            success: !event.is_error(),
            description: payload::short_description(&event.message),
        })
    }
}
