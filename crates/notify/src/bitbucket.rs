//! Bitbucket Cloud adapter: build statuses with read-before-write
//! idempotence.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::commit_status::StatusUpdate;
use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

const API_BASE: &str = "https://api.bitbucket.org/2.0";

/// Bitbucket rejects build keys longer than 40 characters.
const MAX_KEY_LENGTH: usize = 40;

#[derive(Debug)]
pub(crate) struct BitbucketNotifier {
    client: Client,
    api_base: String,
    workspace: String,
    repo: String,
    username: String,
    password: String,
    status_id: String,
    commit_url_base: String,
    headers: HashMap<String, String>,
}

impl BitbucketNotifier {
    /// Credentials are `username`/`password` (an app password), or a token
    /// of the form `username:app_password`.
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| NotifyError::Config("address has no host".to_string()))?;
        let mut segments = url.path().trim_matches('/').split('/');
        let workspace = segments.next().unwrap_or_default().to_string();
        let repo = segments
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string();
        if workspace.is_empty() || repo.is_empty() {
            return Err(NotifyError::Config(
                "address must point at a workspace/repository".to_string(),
            ));
        }

        // The cloud API lives on its own host; any other host serves the
        // same API shape at its own root.
        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
        let api_base = if host == "bitbucket.org" {
            API_BASE.to_string()
        } else {
            format!("{}://{host}{port}/2.0", url.scheme())
        };

        let (username, password) = match (&factory.username, &factory.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => {
                let token = factory.require_token()?;
                let (u, p) = token.split_once(':').ok_or_else(|| {
                    NotifyError::Config(
                        "token must have the form username:app_password".to_string(),
                    )
                })?;
                (u.to_string(), p.to_string())
            }
        };

        Ok(Self {
            client: factory.client()?,
            api_base,
            workspace,
            repo,
            username,
            password,
            status_id: factory.require_commit_status_id()?.to_string(),
            commit_url_base: String::from(url),
            headers: factory.headers.clone(),
        })
    }

    fn key(&self) -> String {
        self.status_id.chars().take(MAX_KEY_LENGTH).collect()
    }
}

#[derive(Debug, Deserialize)]
struct RemoteStatus {
    state: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewStatus<'a> {
    key: &'a str,
    state: &'static str,
    description: &'a str,
    url: &'a str,
}

#[async_trait]
impl Notifier for BitbucketNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let update = StatusUpdate::from_event(event, self.key())?;
        let state = if update.success { "SUCCESSFUL" } else { "FAILED" };

        let status_base = format!(
            "{}/repositories/{}/{}/commit/{}/statuses/build",
            self.api_base, self.workspace, self.repo, update.sha
        );

        let response = client::with_headers(
            self.client.get(format!("{status_base}/{}", update.id)),
            &self.headers,
        )
        .basic_auth(&self.username, Some(&self.password))
        .send()
        .await?;

        match response.status().as_u16() {
            200 => {
                let current: RemoteStatus = response.json().await.unwrap_or(RemoteStatus {
                    state: None,
                    description: None,
                });
                if current.state.as_deref() == Some(state)
                    && current.description.as_deref() == Some(update.description.as_str())
                {
                    return Ok(());
                }
            }
            404 => {}
            status => {
                return Err(NotifyError::Status {
                    service: "bitbucket",
                    status,
                })
            }
        }

        let commit_url = format!("{}/commits/{}", self.commit_url_base, update.sha);
        let response = client::with_headers(self.client.post(&status_base), &self.headers)
            .basic_auth(&self.username, Some(&self.password))
            .json(&NewStatus {
                key: &update.id,
                state,
                description: &update.description,
                url: &commit_url,
            })
            .send()
            .await?;
        client::expect_success("bitbucket", response.status())
    }
}
