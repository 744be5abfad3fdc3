//! Telegram adapter: bot API sendMessage.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

const DEFAULT_API: &str = "https://api.telegram.org";

#[derive(Debug)]
pub(crate) struct TelegramNotifier {
    client: Client,
    url: String,
    chat_id: String,
    headers: HashMap<String, String>,
}

impl TelegramNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let base = factory.address_or(DEFAULT_API);
        let token = factory.require_token()?;
        Ok(Self {
            client: factory.client()?,
            url: format!("{base}/bot{token}/sendMessage"),
            chat_id: factory.require_channel()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SendMessage {
    chat_id: String,
    text: String,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let mut text = format!("{}\n{}", payload::title(event), event.message);
        for (key, value) in payload::fields(event) {
            text.push_str(&format!("\n{key}: {value}"));
        }

        client::post_json(
            &self.client,
            "telegram",
            &self.url,
            &self.headers,
            &SendMessage {
                chat_id: self.chat_id.clone(),
                text,
            },
        )
        .await
    }
}
