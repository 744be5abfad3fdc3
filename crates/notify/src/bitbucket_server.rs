//! Bitbucket Server / Data Center adapter: build statuses via the
//! build-status REST API.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::commit_status::StatusUpdate;
use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct BitbucketServerNotifier {
    client: Client,
    base: String,
    token: String,
    status_id: String,
    headers: HashMap<String, String>,
}

impl BitbucketServerNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| NotifyError::Config("address has no host".to_string()))?;
        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
        Ok(Self {
            client: factory.client()?,
            base: format!("{}://{host}{port}", url.scheme()),
            token: factory.require_token()?.to_string(),
            status_id: factory.require_commit_status_id()?.to_string(),
            headers: factory.headers.clone(),
        })
    }

    fn commit_url(&self, sha: &str) -> String {
        format!("{}/rest/build-status/1.0/commits/{sha}", self.base)
    }
}

#[derive(Debug, Deserialize, Default)]
struct StatusPage {
    #[serde(default)]
    values: Vec<RemoteStatus>,
}

#[derive(Debug, Deserialize)]
struct RemoteStatus {
    key: Option<String>,
    state: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewStatus<'a> {
    state: &'static str,
    key: &'a str,
    name: &'a str,
    description: &'a str,
    url: &'a str,
}

#[async_trait]
impl Notifier for BitbucketServerNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let update = StatusUpdate::from_event(event, self.status_id.clone())?;
        let state = if update.success { "SUCCESSFUL" } else { "FAILED" };
        let url = self.commit_url(&update.sha);

        let response = client::with_headers(self.client.get(&url), &self.headers)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        let page: StatusPage = if status.is_success() {
            response.json().await.unwrap_or_default()
        } else if status.as_u16() == 404 {
            StatusPage::default()
        } else {
            return Err(NotifyError::Status {
                service: "bitbucketserver",
                status: status.as_u16(),
            });
        };

        let unchanged = page.values.iter().any(|s| {
            s.key.as_deref() == Some(update.id.as_str())
                && s.state.as_deref() == Some(state)
                && s.description.as_deref() == Some(update.description.as_str())
        });
        if unchanged {
            return Ok(());
        }

        let response = client::with_headers(self.client.post(&url), &self.headers)
            .bearer_auth(&self.token)
            .json(&NewStatus {
                state,
                key: &update.id,
                name: &update.id,
                description: &update.description,
                url: &self.base,
            })
            .send()
            .await?;
        client::expect_success("bitbucketserver", response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> Event {
        let mut event: Event = serde_json::from_value(serde_json::json!({
            "involvedObject": {"apiVersion": "kustomize.toolkit.fluxcd.io/v1",
                "kind": "Kustomization", "name": "podinfo", "namespace": "apps"},
            "severity": "info",
            "timestamp": "2025-03-01T12:00:00Z",
            "message": "applied revision main@sha1:abc123",
            "reason": "ReconciliationSucceeded",
            "reportingController": "kustomize-controller"
        }))
        .unwrap();
        event.metadata = Some(BTreeMap::from([(
            "revision".to_string(),
            "main@sha1:abc123".to_string(),
        )]));
        event
    }

    fn factory(server: &MockServer) -> ProviderFactory {
        ProviderFactory {
            address: Some(server.uri()),
            token: Some("bbs-token".to_string()),
            commit_status_id: Some("kustomization/podinfo/uid12345".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn writes_when_remote_differs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/build-status/1.0/commits/abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"values": []})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/build-status/1.0/commits/abc123"))
            .and(body_partial_json(serde_json::json!({
                "state": "SUCCESSFUL",
                "key": "kustomization/podinfo/uid12345"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = BitbucketServerNotifier::new(&factory(&server)).unwrap();
        notifier.post(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn suppresses_write_when_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/build-status/1.0/commits/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "values": [{
                    "key": "kustomization/podinfo/uid12345",
                    "state": "SUCCESSFUL",
                    "description": "applied revision main@sha1:abc123"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = BitbucketServerNotifier::new(&factory(&server)).unwrap();
        notifier.post(&event()).await.unwrap();
    }
}
