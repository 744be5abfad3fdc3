//! Shared reference types used across the subscription kinds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to an object in the same namespace as the referrer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocalObjectReference {
    /// Name of the referenced object.
    pub name: String,
}

impl LocalObjectReference {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Selector for objects that may live outside the referrer's namespace.
///
/// Used both as an Alert event source and as a Receiver target reference.
/// A `name` of `"*"` selects every object of the kind within the namespace,
/// optionally narrowed by `match_labels`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrossNamespaceObjectReference {
    /// API version of the referenced kind, e.g. `source.toolkit.fluxcd.io/v1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind of the referenced object. Must not be empty.
    pub kind: String,

    /// Name of the referenced object, or `"*"` for a wildcard selection.
    pub name: String,

    /// Namespace of the referenced object. Defaults to the referrer's
    /// namespace when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Label selector applied when `name` is `"*"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
}

impl CrossNamespaceObjectReference {
    /// Whether this reference selects by wildcard rather than by name.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }

    /// The namespace to resolve against, falling back to `default_ns`.
    #[must_use]
    pub fn namespace_or<'a>(&'a self, default_ns: &'a str) -> &'a str {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => default_ns,
        }
    }

    /// Render `match_labels` as a Kubernetes label-selector string.
    #[must_use]
    pub fn label_selector(&self) -> Option<String> {
        let labels = self.match_labels.as_ref()?;
        if labels.is_empty() {
            return None;
        }
        Some(
            labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_detection() {
        let mut r = CrossNamespaceObjectReference {
            kind: "Bucket".to_string(),
            name: "*".to_string(),
            ..Default::default()
        };
        assert!(r.is_wildcard());
        r.name = "foo".to_string();
        assert!(!r.is_wildcard());
    }

    #[test]
    fn namespace_fallback() {
        let r = CrossNamespaceObjectReference {
            kind: "Bucket".to_string(),
            name: "foo".to_string(),
            namespace: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(r.namespace_or("default"), "default");

        let r = CrossNamespaceObjectReference {
            namespace: Some("flux-system".to_string()),
            ..r
        };
        assert_eq!(r.namespace_or("default"), "flux-system");
    }

    #[test]
    fn label_selector_rendering() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "podinfo".to_string());
        labels.insert("tier".to_string(), "web".to_string());
        let r = CrossNamespaceObjectReference {
            kind: "Bucket".to_string(),
            name: "*".to_string(),
            match_labels: Some(labels),
            ..Default::default()
        };
        assert_eq!(r.label_selector().as_deref(), Some("app=podinfo,tier=web"));
    }
}
