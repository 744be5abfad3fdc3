//! PagerDuty adapter: Events API v2.
//!
//! Error events trigger an incident keyed by the involved object; the
//! matching informational event resolves it, so flapping objects do not
//! accumulate open incidents.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

const DEFAULT_API: &str = "https://events.pagerduty.com";

#[derive(Debug)]
pub(crate) struct PagerDutyNotifier {
    client: Client,
    url: String,
    routing_key: String,
    headers: HashMap<String, String>,
}

impl PagerDutyNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let base = factory.address_or(DEFAULT_API);
        Ok(Self {
            client: factory.client()?,
            url: format!("{base}/v2/enqueue"),
            routing_key: factory.require_token()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct PagerDutyEvent {
    routing_key: String,
    event_action: &'static str,
    dedup_key: String,
    payload: EventPayload,
}

#[derive(Debug, Serialize)]
struct EventPayload {
    summary: String,
    source: String,
    severity: &'static str,
    custom_details: HashMap<String, String>,
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let body = PagerDutyEvent {
            routing_key: self.routing_key.clone(),
            event_action: if event.is_error() { "trigger" } else { "resolve" },
            dedup_key: payload::title(event),
            payload: EventPayload {
                summary: event.message.clone(),
                source: event.reporting_controller.clone(),
                severity: if event.is_error() { "error" } else { "info" },
                custom_details: payload::fields(event).into_iter().collect(),
            },
        };

        client::post_json(&self.client, "pagerduty", &self.url, &self.headers, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn errors_trigger_and_infos_resolve() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .and(body_partial_json(serde_json::json!({
                "event_action": "trigger",
                "dedup_key": "bucket/foo.ns1"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut event: Event = serde_json::from_value(serde_json::json!({
            "involvedObject": {"apiVersion": "source.toolkit.fluxcd.io/v1",
                "kind": "Bucket", "name": "foo", "namespace": "ns1"},
            "severity": "error",
            "timestamp": "2025-03-01T12:00:00Z",
            "message": "fetch failed",
            "reason": "FetchFailed",
            "reportingController": "source-controller"
        }))
        .unwrap();

        let factory = ProviderFactory {
            address: Some(server.uri()),
            token: Some("routing-key".to_string()),
            ..Default::default()
        };
        let notifier = PagerDutyNotifier::new(&factory).unwrap();
        notifier.post(&event).await.unwrap();

        server.reset().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"event_action": "resolve"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        event.severity = "info".to_string();
        notifier.post(&event).await.unwrap();
    }
}
