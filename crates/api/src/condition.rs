//! Status conditions shared by the subscription kinds.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set when a subscription is fully reconciled.
pub const READY: &str = "Ready";

/// Condition type set while a change is being acted upon.
pub const RECONCILING: &str = "Reconciling";

/// Condition type set when reconciliation cannot make progress without a
/// spec change (invalid expression, blocked scheme).
pub const STALLED: &str = "Stalled";

/// Well-known condition reasons.
pub mod reason {
    pub const SUCCEEDED: &str = "Succeeded";
    pub const PROGRESSING: &str = "Progressing";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const TOKEN_NOT_FOUND: &str = "TokenNotFound";
    pub const INVALID_FILTER_EXPRESSION: &str = "InvalidFilterExpression";
    pub const INSECURE_ADDRESS: &str = "InsecureAddress";
    pub const SUSPENDED: &str = "Suspended";
}

/// A single observation of a subscription's state, mirroring the
/// `metav1.Condition` wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `Ready`.
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`.
    pub status: String,
    /// Machine-readable reason for the last transition.
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
    /// RFC 3339 timestamp of the last status transition.
    pub last_transition_time: String,
    /// Generation of the spec this condition was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Build a condition stamped with the current time.
    #[must_use]
    pub fn new(
        type_: &str,
        status: bool,
        reason: &str,
        message: impl Into<String>,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Utc::now().to_rfc3339(),
            observed_generation,
        }
    }
}

/// Find a condition by type.
#[must_use]
pub fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether the `Ready` condition is present and `True`.
#[must_use]
pub fn is_ready(conditions: &[Condition]) -> bool {
    find(conditions, READY).is_some_and(|c| c.status == "True")
}

/// Whether the `Stalled` condition is present and `True`.
#[must_use]
pub fn is_stalled(conditions: &[Condition]) -> bool {
    find(conditions, STALLED).is_some_and(|c| c.status == "True")
}

/// Insert or replace a condition of the same type.
///
/// The transition timestamp is preserved when the status did not flip, so
/// repeated reconciles of an unchanged object do not churn the status.
pub fn set(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Remove a condition by type.
pub fn clear(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.type_ != type_);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_same_type() {
        let mut conditions = vec![];
        set(
            &mut conditions,
            Condition::new(READY, false, reason::PROGRESSING, "working", Some(1)),
        );
        set(
            &mut conditions,
            Condition::new(READY, true, reason::SUCCEEDED, "done", Some(1)),
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert!(is_ready(&conditions));
    }

    #[test]
    fn transition_time_preserved_when_status_unchanged() {
        let mut conditions = vec![];
        let mut first = Condition::new(READY, true, reason::SUCCEEDED, "done", Some(1));
        first.last_transition_time = "2024-01-01T00:00:00+00:00".to_string();
        set(&mut conditions, first);
        set(
            &mut conditions,
            Condition::new(READY, true, reason::SUCCEEDED, "done again", Some(2)),
        );
        assert_eq!(
            conditions[0].last_transition_time,
            "2024-01-01T00:00:00+00:00"
        );
        assert_eq!(conditions[0].observed_generation, Some(2));
    }

    #[test]
    fn stalled_detection() {
        let mut conditions = vec![];
        set(
            &mut conditions,
            Condition::new(
                STALLED,
                true,
                reason::INVALID_FILTER_EXPRESSION,
                "parse error",
                None,
            ),
        );
        assert!(is_stalled(&conditions));
        assert!(!is_ready(&conditions));
    }
}
