//! Event decoration applied per matched alert before dispatch.

use beacon_api::{Alert, Event};
use std::collections::BTreeMap;
use tracing::debug;

/// Clone and decorate the event for one alert: prune metadata to the
/// involved object's group, merge in the alert's constant metadata without
/// overwriting, and stamp the alert summary.
#[must_use]
pub fn decorate(event: &Event, alert: &Alert) -> Event {
    let mut decorated = event.clone();
    decorated.clean_metadata();

    let mut metadata: BTreeMap<String, String> = decorated.metadata.take().unwrap_or_default();

    for (key, value) in alert.spec.event_metadata.iter().flatten() {
        if metadata.contains_key(key) {
            debug!(key, "alert metadata key shadowed by event metadata");
        } else {
            metadata.insert(key.clone(), value.clone());
        }
    }

    if let Some(summary) = alert.spec.summary.as_deref().filter(|s| !s.is_empty()) {
        metadata.insert("summary".to_string(), summary.to_string());
    }

    if !metadata.is_empty() {
        decorated.metadata = Some(metadata);
    }
    decorated
}
