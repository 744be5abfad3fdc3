//! The Receiver custom resource: an inbound webhook subscription.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::condition::Condition;
use crate::duration;
use crate::reference::{CrossNamespaceObjectReference, LocalObjectReference};

/// Default reconcile interval for receivers.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// The kind of webhook source a [`Receiver`] accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverType {
    Generic,
    #[serde(rename = "generic-hmac")]
    GenericHmac,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    Bitbucket,
    Harbor,
    #[serde(rename = "dockerhub")]
    DockerHub,
    Quay,
    #[serde(rename = "gcr")]
    Gcr,
    Nexus,
    #[serde(rename = "acr")]
    Acr,
    #[serde(rename = "cdevents")]
    CdEvents,
}

impl ReceiverType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::GenericHmac => "generic-hmac",
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Harbor => "harbor",
            Self::DockerHub => "dockerhub",
            Self::Quay => "quay",
            Self::Gcr => "gcr",
            Self::Nexus => "nexus",
            Self::Acr => "acr",
            Self::CdEvents => "cdevents",
        }
    }
}

impl std::fmt::Display for ReceiverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a receiver.
#[derive(Clone, Debug, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "notification.beacon.dev",
    version = "v1",
    kind = "Receiver",
    namespaced,
    status = "ReceiverStatus",
    shortname = "rcv"
)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverSpec {
    /// Webhook source kind, selecting authentication and event headers.
    #[serde(rename = "type")]
    pub type_: ReceiverType,

    /// Accepted event indicators, compared case-insensitively against the
    /// type-specific event header. Empty means all events are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,

    /// Secret with a `token` key. The token both authenticates callers
    /// (where the type validates) and derives the webhook path.
    pub secret_ref: LocalObjectReference,

    /// Objects annotated when an authenticated webhook arrives.
    pub resources: Vec<CrossNamespaceObjectReference>,

    /// Boolean expression over `req` and `res` deciding per target whether
    /// to annotate it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_filter: Option<String>,

    /// Reconcile interval, e.g. `10m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// When set, the gateway answers 503 for this receiver.
    #[serde(default)]
    pub suspend: bool,
}

/// Observed state of a receiver.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatus {
    /// The opaque path the gateway serves this receiver on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Compute the webhook path for a receiver identity.
///
/// The format is stable across implementations: `/hook/` followed by the
/// lowercase hex SHA-256 of `token ∥ name ∥ namespace`. Knowledge of the
/// path is the authorization capability, so the token must come from the
/// resolved secret, never from the spec.
#[must_use]
pub fn webhook_path(token: &str, name: &str, namespace: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(name.as_bytes());
    hasher.update(namespace.as_bytes());
    format!("/hook/{}", hex::encode(hasher.finalize()))
}

impl Receiver {
    /// Reconcile interval, falling back to [`DEFAULT_INTERVAL`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.spec
            .interval
            .as_deref()
            .and_then(|t| duration::parse(t).ok())
            .unwrap_or(DEFAULT_INTERVAL)
    }

    /// The published webhook path, if the receiver reconciled to ready.
    #[must_use]
    pub fn published_path(&self) -> Option<&str> {
        self.status.as_ref()?.webhook_path.as_deref()
    }
}
