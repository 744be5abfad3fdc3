//! GitHub repository-dispatch adapter: turns events into workflow triggers.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct GitHubDispatchNotifier {
    client: Client,
    url: String,
    token: String,
    headers: HashMap<String, String>,
}

impl GitHubDispatchNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| NotifyError::Config("address has no host".to_string()))?;
        let mut segments = url.path().trim_matches('/').split('/');
        let owner = segments.next().unwrap_or_default();
        let repo = segments.next().unwrap_or_default().trim_end_matches(".git");
        if owner.is_empty() || repo.is_empty() {
            return Err(NotifyError::Config(
                "address must point at an owner/repository".to_string(),
            ));
        }

        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
        let api_base = if host == "github.com" {
            "https://api.github.com".to_string()
        } else {
            format!("{}://{host}{port}/api/v3", url.scheme())
        };

        Ok(Self {
            client: factory.client()?,
            url: format!("{api_base}/repos/{owner}/{repo}/dispatches"),
            token: factory.require_token()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct Dispatch<'a> {
    /// Workflows filter on this; the event reason is the natural key.
    event_type: &'a str,
    client_payload: &'a Event,
}

#[async_trait]
impl Notifier for GitHubDispatchNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let request = client::with_headers(self.client.post(&self.url), &self.headers)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "beacon")
            .json(&Dispatch {
                event_type: &event.reason,
                client_payload: event,
            });
        let response = request.send().await?;
        client::expect_success("githubdispatch", response.status())
    }
}
