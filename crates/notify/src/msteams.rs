//! Microsoft Teams adapter: incoming-webhook MessageCard.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct MsTeamsNotifier {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl MsTeamsNotifier {
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
struct MessageCard {
    #[serde(rename = "@type")]
    type_: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "themeColor")]
    theme_color: String,
    summary: String,
    sections: Vec<CardSection>,
}

#[derive(Debug, Serialize)]
struct CardSection {
    #[serde(rename = "activityTitle")]
    activity_title: String,
    text: String,
    facts: Vec<CardFact>,
}

#[derive(Debug, Serialize)]
struct CardFact {
    name: String,
    value: String,
}

#[async_trait]
impl Notifier for MsTeamsNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let facts = payload::fields(event)
            .into_iter()
            .map(|(name, value)| CardFact { name, value })
            .collect();

        let card = MessageCard {
            type_: "MessageCard",
            context: "http://schema.org/extensions",
            theme_color: payload::severity_hex(event).trim_start_matches('#').to_string(),
            summary: payload::title(event),
            sections: vec![CardSection {
                activity_title: payload::title(event),
                text: event.message.clone(),
                facts,
            }],
        };

        client::post_json(&self.client, "msteams", &self.url, &self.headers, &card).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn message_card_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "@type": "MessageCard",
                "themeColor": "3498db",
                "summary": "bucket/foo.ns1"
            })))
            .respond_with(ResponseTemplate::new(200))
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
        MsTeamsNotifier::new(&factory)
            .unwrap()
            .post(&event)
            .await
            .unwrap();
    }
}
