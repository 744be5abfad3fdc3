//! The Provider custom resource: an outbound notification endpoint.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::condition::Condition;
use crate::duration;
use crate::reference::LocalObjectReference;

/// Default per-attempt timeout for outbound posts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default reconcile interval for providers.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// The kind of endpoint a [`Provider`] points at.
///
/// Each variant maps to exactly one adapter in the notify registry; the
/// dispatch table is static by design.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Generic,
    #[serde(rename = "generic-hmac")]
    GenericHmac,
    Slack,
    Discord,
    #[serde(rename = "msteams")]
    MsTeams,
    Rocket,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    Gitea,
    Bitbucket,
    #[serde(rename = "bitbucketserver")]
    BitbucketServer,
    #[serde(rename = "azuredevops")]
    AzureDevOps,
    #[serde(rename = "googlechat")]
    GoogleChat,
    #[serde(rename = "googlepubsub")]
    GooglePubSub,
    Webex,
    Sentry,
    #[serde(rename = "azureeventhub")]
    AzureEventHub,
    Telegram,
    Lark,
    Matrix,
    Opsgenie,
    Alertmanager,
    Grafana,
    #[serde(rename = "githubdispatch")]
    GitHubDispatch,
    #[serde(rename = "pagerduty")]
    PagerDuty,
    Datadog,
}

impl ProviderType {
    /// The wire name of the type, as written in the spec.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::GenericHmac => "generic-hmac",
            Self::Slack => "slack",
            Self::Discord => "discord",
            Self::MsTeams => "msteams",
            Self::Rocket => "rocket",
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Gitea => "gitea",
            Self::Bitbucket => "bitbucket",
            Self::BitbucketServer => "bitbucketserver",
            Self::AzureDevOps => "azuredevops",
            Self::GoogleChat => "googlechat",
            Self::GooglePubSub => "googlepubsub",
            Self::Webex => "webex",
            Self::Sentry => "sentry",
            Self::AzureEventHub => "azureeventhub",
            Self::Telegram => "telegram",
            Self::Lark => "lark",
            Self::Matrix => "matrix",
            Self::Opsgenie => "opsgenie",
            Self::Alertmanager => "alertmanager",
            Self::Grafana => "grafana",
            Self::GitHubDispatch => "githubdispatch",
            Self::PagerDuty => "pagerduty",
            Self::Datadog => "datadog",
        }
    }

    /// Whether this type participates in the commit-status subprotocol.
    #[must_use]
    pub fn is_commit_status(&self) -> bool {
        matches!(
            self,
            Self::GitHub
                | Self::GitLab
                | Self::Gitea
                | Self::Bitbucket
                | Self::BitbucketServer
                | Self::AzureDevOps
        )
    }

    /// Whether the type can operate without an explicit address
    /// (the adapter knows the vendor's public API endpoint).
    #[must_use]
    pub fn has_default_address(&self) -> bool {
        matches!(
            self,
            Self::Telegram | Self::Opsgenie | Self::PagerDuty | Self::Datadog | Self::Webex
        )
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a notification provider.
#[derive(Clone, Debug, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "notification.beacon.dev",
    version = "v1",
    kind = "Provider",
    namespaced,
    status = "ProviderStatus",
    shortname = "prov"
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Endpoint kind, selecting the adapter used for delivery.
    #[serde(rename = "type")]
    pub type_: ProviderType,

    /// Endpoint address. May be omitted when the referenced secret carries
    /// an `address` key, or when the type has a well-known API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// HTTP(S) proxy for outbound posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Username, where the vendor payload carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Channel or room, where the vendor payload carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Per-attempt timeout for outbound posts, e.g. `15s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Reconcile interval, e.g. `10m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// When set, the provider is skipped by the event router.
    #[serde(default)]
    pub suspend: bool,

    /// Secret with any of: `address`, `token`, `username`, `password`,
    /// `proxy`, `headers` (YAML map).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,

    /// Secret with a `ca.crt` PEM bundle used for TLS verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_secret_ref: Option<LocalObjectReference>,

    /// Expression producing the commit-status id, evaluated over
    /// `event`, `alert` and `provider`. Commit-status types only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_status_expr: Option<String>,
}

/// Observed state of a notification provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Provider {
    /// Per-attempt timeout, falling back to [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.spec
            .timeout
            .as_deref()
            .and_then(|t| duration::parse(t).ok())
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Reconcile interval, falling back to [`DEFAULT_INTERVAL`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.spec
            .interval
            .as_deref()
            .and_then(|t| duration::parse(t).ok())
            .unwrap_or(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_round_trips_through_serde() {
        for (name, ty) in [
            ("generic", ProviderType::Generic),
            ("generic-hmac", ProviderType::GenericHmac),
            ("msteams", ProviderType::MsTeams),
            ("bitbucketserver", ProviderType::BitbucketServer),
            ("githubdispatch", ProviderType::GitHubDispatch),
            ("azuredevops", ProviderType::AzureDevOps),
        ] {
            let parsed: ProviderType =
                serde_json::from_value(serde_json::json!(name)).expect(name);
            assert_eq!(parsed, ty);
            assert_eq!(parsed.as_str(), name);
        }
    }

    #[test]
    fn commit_status_classification() {
        assert!(ProviderType::GitHub.is_commit_status());
        assert!(ProviderType::AzureDevOps.is_commit_status());
        assert!(!ProviderType::GitHubDispatch.is_commit_status());
        assert!(!ProviderType::Slack.is_commit_status());
    }

    #[test]
    fn timeout_defaults() {
        let spec: ProviderSpec = serde_json::from_value(serde_json::json!({
            "type": "slack",
            "address": "https://hooks.slack.com/services/x"
        }))
        .unwrap();
        let provider = Provider::new("test", spec);
        assert_eq!(provider.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(provider.interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn timeout_parsed_from_spec() {
        let spec: ProviderSpec = serde_json::from_value(serde_json::json!({
            "type": "slack",
            "address": "https://hooks.slack.com/services/x",
            "timeout": "30s"
        }))
        .unwrap();
        let provider = Provider::new("test", spec);
        assert_eq!(provider.timeout(), Duration::from_secs(30));
    }
}
