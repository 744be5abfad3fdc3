//! Status patching helpers shared by the reconcilers.

use beacon_api::condition::{self, Condition};
use kube::api::{Patch, PatchParams};
use kube::core::object::HasStatus;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;

use crate::Result;

/// Merge-patch an object's status subresource.
///
/// Optimistic-concurrency conflicts are retried once; a second conflict
/// surfaces, and the controller requeues.
pub async fn patch<K>(api: &Api<K>, name: &str, status: &impl Serialize) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let patch = Patch::Merge(json!({ "status": status }));
    let params = PatchParams::default();
    match api.patch_status(name, &params, &patch).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 409 => {
            api.patch_status(name, &params, &patch).await?;
            Ok(())
        }
        Err(other) => Err(other.into()),
    }
}

/// Apply a condition to an object's in-memory condition list, stamping the
/// current generation.
pub fn apply_condition<K>(
    object: &K,
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: bool,
    reason: &str,
    message: impl Into<String>,
) where
    K: Resource,
{
    condition::set(
        conditions,
        Condition::new(type_, status, reason, message, object.meta().generation),
    );
}

/// Current conditions of an object, cloned for mutation.
pub fn current_conditions<K, S>(object: &K, read: impl Fn(&S) -> &Vec<Condition>) -> Vec<Condition>
where
    K: HasStatus<Status = S>,
{
    object
        .status()
        .map(|s| read(s).clone())
        .unwrap_or_default()
}

/// Whether the object's spec generation has been observed by status.
pub fn up_to_date<K>(object: &K, observed_generation: Option<i64>) -> bool
where
    K: Resource,
{
    object.meta().generation == observed_generation
}

/// Short identity string for logs: `namespace/name`.
pub fn identity<K>(object: &K) -> String
where
    K: Resource<DynamicType = ()> + ResourceExt,
{
    format!(
        "{}/{}",
        object.namespace().unwrap_or_default(),
        object.name_any()
    )
}
