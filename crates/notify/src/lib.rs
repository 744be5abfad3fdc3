//! Outbound notification adapters.
//!
//! A [`ProviderFactory`] carries the resolved credentials and plumbing of
//! one provider and hands out a [`Notifier`] per provider type. Every
//! adapter is self-contained: it builds the vendor payload, posts it with
//! the shared HTTP client, and maps the response onto the retryable /
//! terminal error split. The dispatch table is static; adding a provider
//! type means adding one module and one match arm.

pub mod commit_status;
pub mod factory;
pub mod payload;
pub mod redact;
pub mod token_cache;

mod client;

mod alertmanager;
mod azure_devops;
mod azure_eventhub;
mod bitbucket;
mod bitbucket_server;
mod datadog;
mod discord;
mod generic;
mod gitea;
mod github;
mod github_dispatch;
mod gitlab;
mod google_chat;
mod google_pubsub;
mod grafana;
mod lark;
mod matrix;
mod msteams;
mod opsgenie;
mod pagerduty;
mod rocket;
mod sentry;
mod slack;
mod telegram;
mod webex;

pub use factory::ProviderFactory;
pub use redact::Redactor;
pub use token_cache::{CacheKey, TokenCache};

use async_trait::async_trait;
use beacon_api::Event;
use thiserror::Error;

/// A send-capable endpoint for one provider type.
///
/// `post` must respect the factory's per-attempt timeout (baked into the
/// underlying client), use the configured proxy and CA pool, and attach the
/// configured headers. Cancellation is cooperative: dropping the future
/// aborts the request.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn post(&self, event: &Event) -> Result<(), NotifyError>;
}

/// Delivery failure. The retryable / terminal split drives the dispatch
/// retry loop: connection errors and 5xx are worth retrying, 4xx are not.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The provider configuration cannot produce a working notifier.
    #[error("invalid provider configuration: {0}")]
    Config(String),

    /// Connection-level failure (refused, reset, timeout).
    #[error("request failed: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },
}

impl NotifyError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        // The error text can embed the request URL, which for webhook-style
        // providers is itself a credential; keep only the error kind.
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connection error"
        } else if err.is_builder() {
            "client build error"
        } else {
            "request error"
        };
        Self::Transport(kind.to_string())
    }
}
