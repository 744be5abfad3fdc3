//! Webex adapter: messages API with a bearer token.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

const DEFAULT_API: &str = "https://webexapis.com/v1/messages";

#[derive(Debug)]
pub(crate) struct WebexNotifier {
    client: Client,
    url: String,
    token: String,
    room_id: String,
    headers: HashMap<String, String>,
}

impl WebexNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        Ok(Self {
            client: factory.client()?,
            url: factory.address_or(DEFAULT_API),
            token: factory.require_token()?.to_string(),
            room_id: factory.require_channel()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct WebexMessage {
    #[serde(rename = "roomId")]
    room_id: String,
    markdown: String,
}

#[async_trait]
impl Notifier for WebexNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let mut markdown = format!("**{}**\n\n{}", payload::title(event), event.message);
        for (key, value) in payload::fields(event) {
            markdown.push_str(&format!("\n- **{key}**: {value}"));
        }

        let request = client::with_headers(self.client.post(&self.url), &self.headers)
            .bearer_auth(&self.token)
            .json(&WebexMessage {
                room_id: self.room_id.clone(),
                markdown,
            });
        let response = request.send().await?;
        client::expect_success("webex", response.status())
    }
}
