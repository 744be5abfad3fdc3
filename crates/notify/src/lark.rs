//! Lark (Feishu) adapter: interactive card webhook.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct LarkNotifier {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl LarkNotifier {
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
struct LarkPayload {
    msg_type: &'static str,
    card: LarkCard,
}

#[derive(Debug, Serialize)]
struct LarkCard {
    header: LarkHeader,
    elements: Vec<LarkElement>,
}

#[derive(Debug, Serialize)]
struct LarkHeader {
    title: LarkText,
    /// Card accent: `green` for info, `red` for errors.
    template: &'static str,
}

#[derive(Debug, Serialize)]
struct LarkText {
    tag: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct LarkElement {
    tag: &'static str,
    text: LarkText,
}

#[async_trait]
impl Notifier for LarkNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let mut content = event.message.clone();
        for (key, value) in payload::fields(event) {
            content.push_str(&format!("\n**{key}**: {value}"));
        }

        let message = LarkPayload {
            msg_type: "interactive",
            card: LarkCard {
                header: LarkHeader {
                    title: LarkText {
                        tag: "plain_text",
                        content: payload::title(event),
                    },
                    template: if event.is_error() { "red" } else { "green" },
                },
                elements: vec![LarkElement {
                    tag: "div",
                    text: LarkText {
                        tag: "lark_md",
                        content,
                    },
                }],
            },
        };

        client::post_json(&self.client, "lark", &self.url, &self.headers, &message).await
    }
}
