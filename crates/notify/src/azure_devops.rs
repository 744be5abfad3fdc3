//! Azure DevOps adapter: git commit statuses with read-before-write
//! idempotence.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::commit_status::StatusUpdate;
use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

const API_VERSION: &str = "6.0";
const STATUS_GENRE: &str = "beacon";

#[derive(Debug)]
pub(crate) struct AzureDevOpsNotifier {
    client: Client,
    /// `{base}/{org}/{project}/_apis/git/repositories/{repo}`
    repo_api: String,
    token: String,
    status_id: String,
    headers: HashMap<String, String>,
}

impl AzureDevOpsNotifier {
    /// The address has the form
    /// `https://dev.azure.com/<org>/<project>/_git/<repository>`.
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| NotifyError::Config("address has no host".to_string()))?;
        let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
        let (org, project, repo) = match segments.as_slice() {
            [org, project, "_git", repo] => (*org, *project, *repo),
            _ => {
                return Err(NotifyError::Config(
                    "address must have the form <org>/<project>/_git/<repository>".to_string(),
                ))
            }
        };
        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();

        Ok(Self {
            client: factory.client()?,
            repo_api: format!(
                "{}://{host}{port}/{org}/{project}/_apis/git/repositories/{repo}",
                url.scheme()
            ),
            token: factory.require_token()?.to_string(),
            status_id: factory.require_commit_status_id()?.to_string(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct StatusPage {
    #[serde(default)]
    value: Vec<RemoteStatus>,
}

#[derive(Debug, Deserialize)]
struct RemoteStatus {
    state: Option<String>,
    description: Option<String>,
    context: Option<RemoteContext>,
}

#[derive(Debug, Deserialize)]
struct RemoteContext {
    name: Option<String>,
    genre: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewStatus<'a> {
    state: &'static str,
    description: &'a str,
    context: NewContext<'a>,
}

#[derive(Debug, Serialize)]
struct NewContext<'a> {
    name: &'a str,
    genre: &'static str,
}

#[async_trait]
impl Notifier for AzureDevOpsNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let update = StatusUpdate::from_event(event, self.status_id.clone())?;
        let state = if update.success { "succeeded" } else { "failed" };
        let url = format!(
            "{}/commits/{}/statuses?api-version={API_VERSION}",
            self.repo_api, update.sha
        );

        // PATs authenticate as basic auth with an empty user.
        let response = client::with_headers(self.client.get(&url), &self.headers)
            .basic_auth("", Some(&self.token))
            .send()
            .await?;
        let status = response.status();
        let page: StatusPage = if status.is_success() {
            response.json().await.unwrap_or_default()
        } else if status.as_u16() == 404 {
            StatusPage::default()
        } else {
            return Err(NotifyError::Status {
                service: "azuredevops",
                status: status.as_u16(),
            });
        };

        let unchanged = page.value.iter().any(|s| {
            s.context
                .as_ref()
                .is_some_and(|c| {
                    c.name.as_deref() == Some(update.id.as_str())
                        && c.genre.as_deref() == Some(STATUS_GENRE)
                })
                && s.state.as_deref() == Some(state)
                && s.description.as_deref() == Some(update.description.as_str())
        });
        if unchanged {
            return Ok(());
        }

        let response = client::with_headers(self.client.post(&url), &self.headers)
            .basic_auth("", Some(&self.token))
            .json(&NewStatus {
                state,
                description: &update.description,
                context: NewContext {
                    name: &update.id,
                    genre: STATUS_GENRE,
                },
            })
            .send()
            .await?;
        client::expect_success("azuredevops", response.status())
    }
}
