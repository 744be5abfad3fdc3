//! Sentry adapter: store API addressed by DSN.

use async_trait::async_trait;
use beacon_api::Event;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, payload, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct SentryNotifier {
    client: Client,
    url: String,
    public_key: String,
    environment: Option<String>,
    headers: HashMap<String, String>,
}

impl SentryNotifier {
    /// The address is a DSN: `https://<key>@<host>/<project>`.
    pub(crate) fn new(factory: &ProviderFactory) -> Result<Self, NotifyError> {
        let dsn = factory.require_url()?;
        let public_key = dsn.username().to_string();
        if public_key.is_empty() {
            return Err(NotifyError::Config(
                "sentry DSN is missing its public key".to_string(),
            ));
        }
        let host = dsn
            .host_str()
            .ok_or_else(|| NotifyError::Config("sentry DSN is missing a host".to_string()))?;
        let project = dsn.path().trim_matches('/');
        if project.is_empty() {
            return Err(NotifyError::Config(
                "sentry DSN is missing a project id".to_string(),
            ));
        }
        let port = dsn.port().map(|p| format!(":{p}")).unwrap_or_default();

        Ok(Self {
            client: factory.client()?,
            url: format!("{}://{host}{port}/api/{project}/store/", dsn.scheme()),
            public_key,
            environment: factory.channel.clone(),
            headers: factory.headers.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SentryEvent {
    message: String,
    level: &'static str,
    platform: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    tags: HashMap<String, String>,
    timestamp: String,
}

#[async_trait]
impl Notifier for SentryNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let (kind, namespace, name) = event.object_coordinates();
        let mut tags: HashMap<String, String> = payload::fields(event).into_iter().collect();
        tags.insert("kind".to_string(), kind.to_string());
        tags.insert("name".to_string(), name.to_string());
        tags.insert("namespace".to_string(), namespace.to_string());
        tags.insert("reason".to_string(), event.reason.clone());

        let body = SentryEvent {
            message: event.message.clone(),
            level: if event.is_error() { "error" } else { "info" },
            platform: "other",
            environment: self.environment.clone(),
            tags,
            timestamp: event.timestamp.to_rfc3339(),
        };

        let auth = format!(
            "Sentry sentry_version=7, sentry_client=beacon, sentry_key={}",
            self.public_key
        );
        let request = client::with_headers(self.client.post(&self.url), &self.headers)
            .header("X-Sentry-Auth", auth)
            .json(&body);
        let response = request.send().await?;
        client::expect_success("sentry", response.status())
    }
}
