//! Gitea adapter: commit statuses with read-before-write idempotence.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::commit_status::StatusUpdate;
use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct GiteaNotifier {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
    status_id: String,
    headers: HashMap<String, String>,
}

impl GiteaNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| NotifyError::Config("address has no host".to_string()))?;
        let mut segments = url.path().trim_matches('/').split('/');
        let owner = segments.next().unwrap_or_default().to_string();
        let repo = segments
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string();
        if owner.is_empty() || repo.is_empty() {
            return Err(NotifyError::Config(
                "address must point at an owner/repository".to_string(),
            ));
        }
        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();

        Ok(Self {
            client: factory.client()?,
            api_base: format!("{}://{host}{port}/api/v1", url.scheme()),
            owner,
            repo,
            token: factory.require_token()?.to_string(),
            status_id: factory.require_commit_status_id()?.to_string(),
            headers: factory.headers.clone(),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        client::with_headers(builder, &self.headers)
            .header("Authorization", format!("token {}", self.token))
    }
}

#[derive(Debug, Deserialize)]
struct RemoteStatus {
    context: Option<String>,
    status: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewStatus<'a> {
    state: &'static str,
    context: &'a str,
    description: &'a str,
}

#[async_trait]
impl Notifier for GiteaNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let update = StatusUpdate::from_event(event, self.status_id.clone())?;
        let state = if update.success { "success" } else { "failure" };

        let list_url = format!(
            "{}/repos/{}/{}/commits/{}/statuses",
            self.api_base, self.owner, self.repo, update.sha
        );
        let response = self.request(self.client.get(&list_url)).send().await?;
        let status = response.status();
        let current: Vec<RemoteStatus> = if status.is_success() {
            response.json().await.unwrap_or_default()
        } else if status.as_u16() == 404 {
            Vec::new()
        } else {
            return Err(NotifyError::Status {
                service: "gitea",
                status: status.as_u16(),
            });
        };

        let unchanged = current.iter().any(|s| {
            s.context.as_deref() == Some(update.id.as_str())
                && s.status.as_deref() == Some(state)
                && s.description.as_deref() == Some(update.description.as_str())
        });
        if unchanged {
            return Ok(());
        }

        let post_url = format!(
            "{}/repos/{}/{}/statuses/{}",
            self.api_base, self.owner, self.repo, update.sha
        );
        let response = self
            .request(self.client.post(&post_url))
            .json(&NewStatus {
                state,
                context: &update.id,
                description: &update.description,
            })
            .send()
            .await?;
        client::expect_success("gitea", response.status())
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
            address: Some(format!("{}/org/repo", server.uri())),
            token: Some("gitea-token".to_string()),
            commit_status_id: Some("kustomization/podinfo/uid12345".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn writes_when_remote_differs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/org/repo/commits/abc123/statuses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/repos/org/repo/statuses/abc123"))
            .and(body_partial_json(serde_json::json!({
                "state": "success",
                "context": "kustomization/podinfo/uid12345"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = GiteaNotifier::new(&factory(&server)).unwrap();
        notifier.post(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn suppresses_write_when_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/org/repo/commits/abc123/statuses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "context": "kustomization/podinfo/uid12345",
                "status": "success",
                "description": "applied revision main@sha1:abc123"
            }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = GiteaNotifier::new(&factory(&server)).unwrap();
        notifier.post(&event()).await.unwrap();
    }
}
