//! Opsgenie adapter: Alert API v2.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

const DEFAULT_API: &str = "https://api.opsgenie.com";

#[derive(Debug)]
pub(crate) struct OpsgenieNotifier {
    client: Client,
    url: String,
    api_key: String,
    headers: HashMap<String, String>,
}

impl OpsgenieNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let base = factory.address_or(DEFAULT_API);
        Ok(Self {
            client: factory.client()?,
            url: format!("{base}/v2/alerts"),
            api_key: factory.require_token()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct OpsgenieAlert {
    message: String,
    description: String,
    details: HashMap<String, String>,
}

#[async_trait]
impl Notifier for OpsgenieNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let mut details: HashMap<String, String> = payload::fields(event).into_iter().collect();
        details.insert("severity".to_string(), event.severity.clone());
        details.insert("reason".to_string(), event.reason.clone());

        let alert = OpsgenieAlert {
            message: payload::title(event),
            description: event.message.clone(),
            details,
        };

        let request = client::with_headers(self.client.post(&self.url), &self.headers)
            .header("Authorization", format!("GenieKey {}", self.api_key))
            .json(&alert);
        let response = request.send().await?;
        client::expect_success("opsgenie", response.status())
    }
}
