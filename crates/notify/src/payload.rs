//! Helpers shared by the vendor payload builders.

use beacon_api::Event;

/// Accent color used by chat adapters for informational events.
pub const COLOR_INFO: u32 = 0x0034_98db;

/// Accent color used by chat adapters for error events.
pub const COLOR_ERROR: u32 = 0x00e7_4c3c;

/// Canonical title of an event: `kind/name.namespace`.
#[must_use]
pub fn title(event: &Event) -> String {
    let (kind, namespace, name) = event.object_coordinates();
    format!("{}/{name}.{namespace}", kind.to_lowercase())
}

/// Color matching the event severity.
#[must_use]
pub fn severity_color(event: &Event) -> u32 {
    if event.is_error() {
        COLOR_ERROR
    } else {
        COLOR_INFO
    }
}

/// Hex color string (`#rrggbb`) matching the event severity.
#[must_use]
pub fn severity_hex(event: &Event) -> String {
    format!("#{:06x}", severity_color(event))
}

/// Metadata as sorted key/value pairs for vendor field tables. Dispatch
/// runs after metadata cleaning, so keys are bare (`revision`, `summary`).
#[must_use]
pub fn fields(event: &Event) -> Vec<(String, String)> {
    event
        .metadata
        .as_ref()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Look up a cleaned metadata value.
#[must_use]
pub fn metadata<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.metadata.as_ref()?.get(key).map(String::as_str)
}

/// The revision a commit-status update applies to.
#[must_use]
pub fn revision(event: &Event) -> Option<&str> {
    metadata(event, "revision")
}

/// Extract the bare SHA from a revision string like `main@sha1:abc123`.
#[must_use]
pub fn revision_sha(revision: &str) -> &str {
    revision.rsplit(':').next().unwrap_or(revision)
}

/// Truncate a description to the length commit-status APIs accept.
#[must_use]
pub fn short_description(message: &str) -> String {
    const LIMIT: usize = 140;
    if message.len() <= LIMIT {
        return message.to_string();
    }
    let mut cut = LIMIT - 3;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &message[..cut])
}
