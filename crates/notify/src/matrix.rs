//! Matrix adapter: room message over the client-server API.
//!
//! Message sends are idempotent per transaction id, so the id is derived
//! from the event content; a retried attempt lands in the same transaction.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct MatrixNotifier {
    client: Client,
    base: String,
    token: String,
    room_id: String,
    headers: HashMap<String, String>,
}

impl MatrixNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        Ok(Self {
            client: factory.client()?,
            base: String::from(url).trim_end_matches('/').to_string(),
            token: factory.require_token()?.to_string(),
            room_id: factory.require_channel()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct RoomMessage {
    msgtype: &'static str,
    body: String,
}

#[async_trait]
impl Notifier for MatrixNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let mut body = format!("{}: {}", payload::title(event), event.message);
        for (key, value) in payload::fields(event) {
            body.push_str(&format!("\n{key}: {value}"));
        }

        let txn_id = hex::encode(Sha256::digest(body.as_bytes()));
        let url = format!(
            "{}/_matrix/client/r0/rooms/{}/send/m.room.message/{txn_id}",
            self.base, self.room_id
        );

        let request = client::with_headers(self.client.put(url), &self.headers)
            .bearer_auth(&self.token)
            .json(&RoomMessage {
                msgtype: "m.text",
                body,
            });
        let response = request.send().await?;
        client::expect_success("matrix", response.status())
    }
}
