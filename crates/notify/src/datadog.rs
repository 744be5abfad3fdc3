//! Datadog adapter: events API v1.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

const DEFAULT_API: &str = "https://api.datadoghq.com";

#[derive(Debug)]
pub(crate) struct DatadogNotifier {
    client: Client,
    url: String,
    api_key: String,
    headers: HashMap<String, String>,
}

impl DatadogNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let base = factory.address_or(DEFAULT_API);
        Ok(Self {
            client: factory.client()?,
            url: format!("{base}/api/v1/events"),
            api_key: factory.require_token()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct DatadogEvent {
    title: String,
    text: String,
    tags: Vec<String>,
    alert_type: &'static str,
    source_type_name: &'static str,
    date_happened: i64,
}

#[async_trait]
impl Notifier for DatadogNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let (kind, namespace, name) = event.object_coordinates();
        let mut tags = vec![
            format!("kind:{kind}"),
            format!("name:{name}"),
            format!("namespace:{namespace}"),
            format!("reason:{}", event.reason),
        ];
        for (key, value) in payload::fields(event) {
            tags.push(format!("{key}:{value}"));
        }

        let body = DatadogEvent {
            title: payload::title(event),
            text: event.message.clone(),
            tags,
            alert_type: if event.is_error() { "error" } else { "info" },
            source_type_name: "beacon",
            date_happened: event.timestamp.timestamp(),
        };

        let request = client::with_headers(self.client.post(&self.url), &self.headers)
            .header("DD-API-KEY", &self.api_key)
            .json(&body);
        let response = request.send().await?;
        client::expect_success("datadog", response.status())
    }
}
