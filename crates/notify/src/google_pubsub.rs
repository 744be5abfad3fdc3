//! Google Pub/Sub adapter: topic publish over REST.

use async_trait::async_trait;
use base64::Engine;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

const API_BASE: &str = "https://pubsub.googleapis.com/v1";

#[derive(Debug)]
pub(crate) struct GooglePubSubNotifier {
    client: Client,
    url: String,
    token: String,
    attributes: HashMap<String, String>,
}

impl GooglePubSubNotifier {
    /// The address is a fully-qualified topic: `projects/<p>/topics/<t>`.
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let topic = factory.require_address()?;
        if !topic.starts_with("projects/") || !topic.contains("/topics/") {
            return Err(NotifyError::Config(
                "address must have the form projects/<project>/topics/<topic>".to_string(),
            ));
        }
        Ok(Self {
            client: factory.client()?,
            url: format!("{API_BASE}/{topic}:publish"),
            token: factory.require_token()?.to_string(),
            // Configured headers ride along as message attributes; Pub/Sub
            // has no per-request headers worth forwarding.
            attributes: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<PubSubMessage>,
}

#[derive(Debug, Serialize)]
struct PubSubMessage {
    data: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<String, String>,
}

#[async_trait]
impl Notifier for GooglePubSubNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let encoded = serde_json::to_vec(event)
            .map_err(|e| NotifyError::Config(format!("failed to encode event: {e}")))?;
        let body = PublishRequest {
            messages: vec![PubSubMessage {
                data: base64::engine::general_purpose::STANDARD.encode(encoded),
                attributes: self.attributes.clone(),
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        client::expect_success("googlepubsub", response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_shape_enforced() {
        let good = ProviderFactory {
            address: Some("projects/p/topics/t".to_string()),
            token: Some("bearer".to_string()),
            ..Default::default()
        };
        assert!(GooglePubSubNotifier::new(&good).is_ok());

        let bad = ProviderFactory {
            address: Some("https://pubsub.googleapis.com/p/t".to_string()),
            token: Some("bearer".to_string()),
            ..Default::default()
        };
        assert!(GooglePubSubNotifier::new(&bad).is_err());
    }
}
