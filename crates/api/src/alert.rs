//! The Alert custom resource: a routing rule binding event sources to a
//! provider.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::condition::Condition;
use crate::event::SEVERITY_INFO;
use crate::reference::{CrossNamespaceObjectReference, LocalObjectReference};

/// Desired state of an alert.
#[derive(Clone, Debug, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "notification.beacon.dev",
    version = "v1",
    kind = "Alert",
    namespaced,
    status = "AlertStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AlertSpec {
    /// The provider events matching this alert are dispatched to.
    pub provider_ref: LocalObjectReference,

    /// Minimum severity: `info` matches everything, `error` only errors.
    #[serde(default = "default_severity")]
    pub event_severity: String,

    /// Objects whose events this alert subscribes to.
    pub event_sources: Vec<CrossNamespaceObjectReference>,

    /// When non-empty, at least one regex must match the event message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion_list: Option<Vec<String>>,

    /// Events whose message matches any of these regexes are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusion_list: Option<Vec<String>>,

    /// Constant summary attached to dispatched events as `metadata.summary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Constant metadata merged into dispatched events without overwriting
    /// event-supplied keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_metadata: Option<BTreeMap<String, String>>,

    /// When set, the alert is skipped by the event router.
    #[serde(default)]
    pub suspend: bool,
}

fn default_severity() -> String {
    SEVERITY_INFO.to_string()
}

/// Observed state of an alert.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
