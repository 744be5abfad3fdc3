//! Azure Event Hubs adapter: REST send with a SAS token.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct AzureEventHubNotifier {
    client: Client,
    url: String,
    /// Pre-minted SAS token from the provider secret.
    sas_token: String,
    headers: HashMap<String, String>,
}

impl AzureEventHubNotifier {
    /// The address is the hub endpoint:
    /// `https://<namespace>.servicebus.windows.net/<hub>`.
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        if url.path().trim_matches('/').is_empty() {
            return Err(NotifyError::Config(
                "address must include the event hub name".to_string(),
            ));
        }
        let base: String = url.into();
        Ok(Self {
            client: factory.client()?,
            url: format!("{}/messages?api-version=2014-01", base.trim_end_matches('/')),
            sas_token: factory.require_token()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[async_trait]
impl Notifier for AzureEventHubNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(event)
            .map_err(|e| NotifyError::Config(format!("failed to encode event: {e}")))?;

        let request = client::with_headers(self.client.post(&self.url), &self.headers)
            .header("Authorization", &self.sas_token)
            .header("Content-Type", "application/json")
            .body(body);
        let response = request.send().await?;
        client::expect_success("azureeventhub", response.status())
    }
}
