//! Slack adapter: Block Kit webhook payload with an attachment color strip.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct SlackNotifier {
    client: Client,
    url: String,
    channel: Option<String>,
    username: Option<String>,
    headers: HashMap<String, String>,
}

impl SlackNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        Ok(Self {
            client: factory.client()?,
            url: url.into(),
            channel: factory.channel.clone(),
            username: factory.username.clone(),
            headers: factory.headers.clone(),
        })
    }

    fn format_payload(&self, event: &Event) -> SlackPayload {
        let title = payload::title(event);

        let mut blocks = vec![
            // Header with the object identity
            SlackBlock::Section {
                text: SlackText::mrkdwn(format!("*{title}*")),
            },
            // Description
            SlackBlock::Section {
                text: SlackText::mrkdwn(event.message.clone()),
            },
        ];

        // Add a fields section if we have metadata
        let fields: Vec<String> = payload::fields(event)
            .into_iter()
            .map(|(key, value)| format!("*{key}*: {value}"))
            .collect();
        if !fields.is_empty() {
            blocks.push(SlackBlock::Divider);
            blocks.push(SlackBlock::Section {
                text: SlackText::mrkdwn(fields.join(" • ")),
            });
        }

        // Add context with the reporting controller and timestamp
        blocks.push(SlackBlock::Context {
            elements: vec![SlackText::mrkdwn(format!(
                "{} • {}",
                event.reporting_controller,
                event.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            ))],
        });

        SlackPayload {
            text: title, // Fallback for notifications
            channel: self.channel.clone(),
            username: self.username.clone(),
            blocks,
            attachments: vec![SlackAttachment {
                color: payload::severity_hex(event),
                fallback: None,
            }],
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let message = self.format_payload(event);
        client::post_json(&self.client, "slack", &self.url, &self.headers, &message).await
    }
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    /// Fallback text for notifications
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    /// Block Kit blocks
    blocks: Vec<SlackBlock>,
    /// Attachments (for the color strip)
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SlackBlock {
    /// Section block with text
    Section { text: SlackText },
    /// Divider line
    Divider,
    /// Context block for metadata
    Context { elements: Vec<SlackText> },
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    text_type: &'static str,
    text: String,
}

impl SlackText {
    fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            text_type: "mrkdwn",
            text: text.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    /// Hex color for the attachment strip
    color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<String>,
}
