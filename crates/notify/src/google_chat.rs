//! Google Chat adapter: webhook card with key/value widgets.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct GoogleChatNotifier {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl GoogleChatNotifier {
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
struct ChatPayload {
    cards: Vec<Card>,
}

#[derive(Debug, Serialize)]
struct Card {
    header: CardHeader,
    sections: Vec<CardSection>,
}

#[derive(Debug, Serialize)]
struct CardHeader {
    title: String,
    subtitle: String,
}

#[derive(Debug, Serialize)]
struct CardSection {
    widgets: Vec<Widget>,
}

#[derive(Debug, Serialize)]
struct Widget {
    #[serde(rename = "keyValue", skip_serializing_if = "Option::is_none")]
    key_value: Option<KeyValue>,
    #[serde(rename = "textParagraph", skip_serializing_if = "Option::is_none")]
    text_paragraph: Option<TextParagraph>,
}

#[derive(Debug, Serialize)]
struct KeyValue {
    #[serde(rename = "topLabel")]
    top_label: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct TextParagraph {
    text: String,
}

#[async_trait]
impl Notifier for GoogleChatNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let mut widgets = vec![Widget {
            key_value: None,
            text_paragraph: Some(TextParagraph {
                text: event.message.clone(),
            }),
        }];
        widgets.extend(payload::fields(event).into_iter().map(|(k, v)| Widget {
            key_value: Some(KeyValue {
                top_label: k,
                content: v,
            }),
            text_paragraph: None,
        }));

        let message = ChatPayload {
            cards: vec![Card {
                header: CardHeader {
                    title: payload::title(event),
                    subtitle: event.reason.clone(),
                },
                sections: vec![CardSection { widgets }],
            }],
        };

        client::post_json(&self.client, "googlechat", &self.url, &self.headers, &message).await
    }
}
