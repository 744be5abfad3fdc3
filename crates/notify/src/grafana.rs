//! Grafana adapter: annotations API.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct GrafanaNotifier {
    client: Client,
    url: String,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    headers: HashMap<String, String>,
}

impl GrafanaNotifier {
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let base: String = factory.require_url()?.into();
        let url = if base.ends_with("/api/annotations") {
            base
        } else {
            format!("{}/api/annotations", base.trim_end_matches('/'))
        };
        Ok(Self {
            client: factory.client()?,
            url,
            token: factory.token.clone(),
            username: factory.username.clone(),
            password: factory.password.clone(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct GrafanaAnnotation {
    text: String,
    tags: Vec<String>,
}

#[async_trait]
impl Notifier for GrafanaNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let (kind, namespace, name) = event.object_coordinates();
        let mut tags = vec![
            "beacon".to_string(),
            format!("severity:{}", event.severity),
            format!("kind:{kind}"),
            format!("name:{name}"),
            format!("namespace:{namespace}"),
        ];
        for (key, value) in payload::fields(event) {
            tags.push(format!("{key}:{value}"));
        }

        let annotation = GrafanaAnnotation {
            text: format!("{}: {}", payload::title(event), event.message),
            tags,
        };

        let mut request =
            client::with_headers(self.client.post(&self.url), &self.headers).json(&annotation);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        } else if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await?;
        client::expect_success("grafana", response.status())
    }
}
