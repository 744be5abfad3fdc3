//! Event-to-alert matching.

use beacon_api::{condition, Alert, Event, SEVERITY_ERROR};
use beacon_controller::Context;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::{Api, ResourceExt};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of the store-free part of matching.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StaticMatch {
    Rejected,
    Accepted,
    /// A wildcard source selects by labels; the involved object's labels
    /// must be fetched to decide.
    NeedsLabels(Vec<BTreeMap<String, String>>),
}

/// Decide whether an alert subscribes to an event, using only the alert
/// and event themselves. An alert accepted by any source is accepted once.
pub(crate) fn static_match(alert: &Alert, event: &Event, no_cross_namespace: bool) -> StaticMatch {
    if alert.spec.suspend {
        return StaticMatch::Rejected;
    }
    let ready = alert
        .status
        .as_ref()
        .is_some_and(|s| condition::is_ready(&s.conditions));
    if !ready {
        return StaticMatch::Rejected;
    }

    let alert_namespace = alert.namespace().unwrap_or_default();
    let (event_kind, event_namespace, event_name) = event.object_coordinates();

    if no_cross_namespace && event_namespace != alert_namespace {
        return StaticMatch::Rejected;
    }

    // Inclusion: at least one regex must hit when the list is non-empty.
    if let Some(inclusion) = alert.spec.inclusion_list.as_deref() {
        if !inclusion.is_empty() && !any_match(inclusion, &event.message) {
            return StaticMatch::Rejected;
        }
    }
    // Exclusion: any hit drops the event.
    if let Some(exclusion) = alert.spec.exclusion_list.as_deref() {
        if any_match(exclusion, &event.message) {
            return StaticMatch::Rejected;
        }
    }

    let mut label_selectors = Vec::new();
    for source in &alert.spec.event_sources {
        let source_namespace = source.namespace_or(&alert_namespace);
        if source.kind != event_kind || source_namespace != event_namespace {
            continue;
        }
        if alert.spec.event_severity == SEVERITY_ERROR && event.severity != SEVERITY_ERROR {
            continue;
        }

        if source.is_wildcard() {
            match &source.match_labels {
                Some(labels) if !labels.is_empty() => label_selectors.push(labels.clone()),
                // Bare wildcard falls back to kind+namespace selection.
                _ => return StaticMatch::Accepted,
            }
        } else if source.name == event_name {
            return StaticMatch::Accepted;
        }
    }

    if label_selectors.is_empty() {
        StaticMatch::Rejected
    } else {
        StaticMatch::NeedsLabels(label_selectors)
    }
}

fn any_match(patterns: &[String], message: &str) -> bool {
    patterns.iter().any(|pattern| match Regex::new(pattern) {
        Ok(regex) => regex.is_match(message),
        Err(error) => {
            // Admission validates these; a bad pattern here means the
            // alert slipped through, so fail closed for this pattern.
            warn!(pattern, %error, "skipping unparseable message filter");
            false
        }
    })
}

/// Labels of the involved object, fetched at its coordinates.
async fn involved_object_labels(
    ctx: &Context,
    event: &Event,
) -> Option<BTreeMap<String, String>> {
    let object = &event.involved_object;
    let api_version = object.api_version.as_deref().unwrap_or_default();
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    let gvk = GroupVersionKind::gvk(group, version, object.kind.as_deref().unwrap_or_default());

    let (resource, _caps) = kube::discovery::oneshot::pinned_kind(&ctx.client, &gvk)
        .await
        .map_err(|error| debug!(%error, "failed to discover involved object kind"))
        .ok()?;
    let api: Api<DynamicObject> = Api::namespaced_with(
        ctx.client.clone(),
        object.namespace.as_deref().unwrap_or_default(),
        &resource,
    );
    let fetched = api
        .get(object.name.as_deref().unwrap_or_default())
        .await
        .map_err(|error| debug!(%error, "failed to fetch involved object for label match"))
        .ok()?;
    Some(fetched.labels().clone())
}

fn labels_satisfy(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// All alerts subscribing to this event.
pub async fn matching_alerts(
    ctx: &Context,
    event: &Event,
    alerts: Vec<Arc<Alert>>,
) -> Vec<Arc<Alert>> {
    let mut matched = Vec::new();
    let mut fetched_labels: Option<BTreeMap<String, String>> = None;

    for alert in alerts {
        match static_match(&alert, event, ctx.settings.no_cross_namespace_refs) {
            StaticMatch::Rejected => {}
            StaticMatch::Accepted => matched.push(alert),
            StaticMatch::NeedsLabels(selectors) => {
                if fetched_labels.is_none() {
                    fetched_labels = involved_object_labels(ctx, event).await;
                }
                let Some(labels) = fetched_labels.as_ref() else {
                    continue;
                };
                if selectors
                    .iter()
                    .any(|selector| labels_satisfy(selector, labels))
                {
                    matched.push(alert);
                }
            }
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_api::condition::{reason, Condition};
    use beacon_api::AlertStatus;
    use kube::Resource;

    fn ready_alert(spec: serde_json::Value) -> Alert {
        let mut alert = Alert::new("a1", serde_json::from_value(spec).unwrap());
        alert.meta_mut().namespace = Some("ns1".to_string());
        let mut status = AlertStatus::default();
        condition::set(
            &mut status.conditions,
            Condition::new(condition::READY, true, reason::SUCCEEDED, "ok", Some(1)),
        );
        alert.status = Some(status);
        alert
    }

    fn event(value: serde_json::Value) -> Event {
        serde_json::from_value(value).unwrap()
    }

    fn bucket_event(name: &str, namespace: &str, message: &str) -> Event {
        event(serde_json::json!({
            "involvedObject": {
                "apiVersion": "source.toolkit.fluxcd.io/v1",
                "kind": "Bucket",
                "name": name,
                "namespace": namespace
            },
            "severity": "info",
            "timestamp": "2025-03-01T12:00:00Z",
            "message": message,
            "reason": "ReconciliationSucceeded",
            "reportingController": "source-controller"
        }))
    }

    fn wildcard_alert() -> Alert {
        ready_alert(serde_json::json!({
            "providerRef": {"name": "generic"},
            "eventSources": [{"kind": "Bucket", "name": "*", "namespace": "ns1"}]
        }))
    }

    #[test]
    fn wildcard_kind_match() {
        let alert = wildcard_alert();
        let event = bucket_event("foo", "ns1", "ok");
        assert_eq!(static_match(&alert, &event, false), StaticMatch::Accepted);
    }

    #[test]
    fn exclusion_regex_drops_event() {
        let mut alert = wildcard_alert();
        alert.spec.exclusion_list = Some(vec!["excluded".to_string()]);
        let event = bucket_event("foo", "ns1", "this is excluded");
        assert_eq!(static_match(&alert, &event, false), StaticMatch::Rejected);

        let event = bucket_event("foo", "ns1", "fine");
        assert_eq!(static_match(&alert, &event, false), StaticMatch::Accepted);
    }

    #[test]
    fn inclusion_regex_must_hit() {
        let mut alert = wildcard_alert();
        alert.spec.inclusion_list = Some(vec!["^deploy".to_string()]);
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns1", "deploy done"), false),
            StaticMatch::Accepted
        );
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns1", "sync done"), false),
            StaticMatch::Rejected
        );
    }

    #[test]
    fn suspended_or_not_ready_never_matches() {
        let mut alert = wildcard_alert();
        alert.spec.suspend = true;
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns1", "ok"), false),
            StaticMatch::Rejected
        );

        let mut alert = wildcard_alert();
        alert.status = None;
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns1", "ok"), false),
            StaticMatch::Rejected
        );
    }

    #[test]
    fn severity_filter() {
        let mut alert = wildcard_alert();
        alert.spec.event_severity = "error".to_string();
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns1", "ok"), false),
            StaticMatch::Rejected
        );

        let mut error_event = bucket_event("foo", "ns1", "boom");
        error_event.severity = "error".to_string();
        assert_eq!(static_match(&alert, &error_event, false), StaticMatch::Accepted);
    }

    #[test]
    fn name_and_namespace_must_line_up() {
        let alert = ready_alert(serde_json::json!({
            "providerRef": {"name": "generic"},
            "eventSources": [{"kind": "Bucket", "name": "foo"}]
        }));
        // Source namespace defaults to the alert's.
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns1", "ok"), false),
            StaticMatch::Accepted
        );
        assert_eq!(
            static_match(&alert, &bucket_event("bar", "ns1", "ok"), false),
            StaticMatch::Rejected
        );
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns2", "ok"), false),
            StaticMatch::Rejected
        );
    }

    #[test]
    fn cross_namespace_toggle() {
        let alert = ready_alert(serde_json::json!({
            "providerRef": {"name": "generic"},
            "eventSources": [{"kind": "Bucket", "name": "*", "namespace": "ns2"}]
        }));
        let event = bucket_event("foo", "ns2", "ok");
        assert_eq!(static_match(&alert, &event, false), StaticMatch::Accepted);
        assert_eq!(static_match(&alert, &event, true), StaticMatch::Rejected);
    }

    #[test]
    fn wildcard_with_labels_defers_to_fetch() {
        let alert = ready_alert(serde_json::json!({
            "providerRef": {"name": "generic"},
            "eventSources": [{
                "kind": "Bucket",
                "name": "*",
                "matchLabels": {"team": "platform"}
            }]
        }));
        let outcome = static_match(&alert, &bucket_event("foo", "ns1", "ok"), false);
        let StaticMatch::NeedsLabels(selectors) = outcome else {
            panic!("expected a label check, got {outcome:?}");
        };
        assert_eq!(selectors.len(), 1);

        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "platform".to_string());
        labels.insert("extra".to_string(), "x".to_string());
        assert!(labels_satisfy(&selectors[0], &labels));

        labels.insert("team".to_string(), "other".to_string());
        assert!(!labels_satisfy(&selectors[0], &labels));
    }

    #[test]
    fn accepted_once_despite_multiple_matching_sources() {
        let alert = ready_alert(serde_json::json!({
            "providerRef": {"name": "generic"},
            "eventSources": [
                {"kind": "Bucket", "name": "*"},
                {"kind": "Bucket", "name": "foo"}
            ]
        }));
        assert_eq!(
            static_match(&alert, &bucket_event("foo", "ns1", "ok"), false),
            StaticMatch::Accepted
        );
    }
}
