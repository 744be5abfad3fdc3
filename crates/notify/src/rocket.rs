//! Rocket.Chat adapter: webhook attachments, Slack-compatible shape.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct RocketNotifier {
    client: Client,
    url: String,
    channel: Option<String>,
    alias: Option<String>,
    headers: HashMap<String, String>,
}

impl RocketNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        Ok(Self {
            client: factory.client()?,
            url: url.into(),
            channel: factory.channel.clone(),
            alias: factory.username.clone(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct RocketPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    attachments: Vec<RocketAttachment>,
}

#[derive(Debug, Serialize)]
struct RocketAttachment {
    title: String,
    text: String,
    color: String,
    fields: Vec<RocketField>,
}

#[derive(Debug, Serialize)]
struct RocketField {
    title: String,
    value: String,
    short: bool,
}

#[async_trait]
impl Notifier for RocketNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let fields = payload::fields(event)
            .into_iter()
            .map(|(title, value)| RocketField {
                title,
                value,
                short: false,
            })
            .collect();

        let message = RocketPayload {
            channel: self.channel.clone(),
            alias: self.alias.clone(),
            attachments: vec![RocketAttachment {
                title: payload::title(event),
                text: event.message.clone(),
                color: payload::severity_hex(event),
                fields,
            }],
        };

        client::post_json(&self.client, "rocket", &self.url, &self.headers, &message).await
    }
}
