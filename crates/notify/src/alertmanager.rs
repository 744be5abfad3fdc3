//! Alertmanager adapter: API v2 alert push.

use async_trait::async_trait;
use beacon_api::Event;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct AlertmanagerNotifier {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl AlertmanagerNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        Ok(Self {
            client: factory.client()?,
            url: url.into(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct AlertmanagerAlert {
    labels: HashMap<String, String>,
    annotations: HashMap<String, String>,
    #[serde(rename = "startsAt")]
    starts_at: String,
    #[serde(rename = "endsAt")]
    ends_at: String,
}

#[async_trait]
impl Notifier for AlertmanagerNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let (kind, namespace, name) = event.object_coordinates();

        let mut labels = HashMap::from([
            ("alertname".to_string(), format!("Beacon{}{}", kind, event.reason)),
            ("severity".to_string(), event.severity.clone()),
            ("reason".to_string(), event.reason.clone()),
            ("kind".to_string(), kind.to_string()),
            ("name".to_string(), name.to_string()),
            ("namespace".to_string(), namespace.to_string()),
        ]);
        for (key, value) in event.metadata.iter().flatten() {
            labels.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let annotations = HashMap::from([("message".to_string(), event.message.clone())]);

        // Informational events resolve themselves; errors stay open until
        // re-fired or aged out.
        let ends_at = if event.is_error() {
            event.timestamp + Duration::hours(24)
        } else {
            Utc::now() + Duration::minutes(10)
        };

        let alerts = vec![AlertmanagerAlert {
            labels,
            annotations,
            starts_at: event.timestamp.to_rfc3339(),
            ends_at: ends_at.to_rfc3339(),
        }];

        client::post_json(&self.client, "alertmanager", &self.url, &self.headers, &alerts).await
    }
}
