//! Discord adapter: webhook embeds.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct DiscordNotifier {
    client: Client,
    url: String,
    username: Option<String>,
    headers: HashMap<String, String>,
}

impl DiscordNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        Ok(Self {
            client: factory.client()?,
            url: url.into(),
            username: factory.username.clone(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct DiscordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    fields: Vec<DiscordField>,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let fields = payload::fields(event)
            .into_iter()
            .map(|(name, value)| DiscordField {
                name,
                value,
                inline: true,
            })
            .collect();

        let message = DiscordPayload {
            username: self.username.clone(),
            embeds: vec![DiscordEmbed {
                title: payload::title(event),
                description: event.message.clone(),
                color: payload::severity_color(event),
                fields,
            }],
        };

        client::post_json(&self.client, "discord", &self.url, &self.headers, &message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embed_reflects_severity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "embeds": [{"title": "bucket/foo.ns1", "color": payload::COLOR_INFO}]
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let event: Event = serde_json::from_value(serde_json::json!({
            "involvedObject": {"apiVersion": "source.toolkit.fluxcd.io/v1",
                "kind": "Bucket", "name": "foo", "namespace": "ns1"},
            "severity": "info",
            "timestamp": "2025-03-01T12:00:00Z",
            "message": "ok",
            "reason": "ReconciliationSucceeded",
            "reportingController": "source-controller"
        }))
        .unwrap();

        let factory = ProviderFactory {
            address: Some(server.uri()),
            ..Default::default()
        };
        DiscordNotifier::new(&factory)
            .unwrap()
            .post(&event)
            .await
            .unwrap();
    }
}
