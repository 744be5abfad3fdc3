//! Target resolution and annotation for accepted webhooks.

use beacon_api::{CrossNamespaceObjectReference, Receiver, RECONCILE_REQUEST_ANNOTATION};
use beacon_controller::Context;
use beacon_filter::Program;
use chrono::{SecondsFormat, Utc};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TargetError {
    /// A wildcard reference with neither labels nor filter would annotate
    /// an unbounded set; the request is refused outright.
    #[error("unsafe resource reference: {0}")]
    Unsafe(String),

    #[error("store unavailable: {0}")]
    Store(#[from] kube::Error),

    #[error("resource filter rejected: {0}")]
    FilterCompile(String),
}

/// Annotate every target the receiver selects and the filter accepts.
/// Returns the number of annotated objects; zero is a success.
pub async fn trigger_targets(
    ctx: &Context,
    receiver: &Receiver,
    payload: &serde_json::Value,
) -> Result<usize, TargetError> {
    let receiver_namespace = receiver.namespace().unwrap_or_default();

    let filter = match receiver.spec.resource_filter.as_deref() {
        None => None,
        // Compile failures are prevented by the reconciler; a miss here
        // means the cache was evicted, so recompile.
        Some(expr) => Some(
            ctx.programs
                .get(expr)
                .map_err(|err| TargetError::FilterCompile(err.to_string()))?,
        ),
    };

    let mut annotated = 0;
    for reference in &receiver.spec.resources {
        let namespace = reference.namespace_or(&receiver_namespace).to_string();
        if ctx.settings.no_cross_namespace_refs && namespace != receiver_namespace {
            warn!(
                kind = %reference.kind,
                namespace,
                "skipping cross-namespace resource reference"
            );
            continue;
        }

        if reference.is_wildcard()
            && reference.label_selector().is_none()
            && filter.is_none()
        {
            return Err(TargetError::Unsafe(format!(
                "wildcard reference to kind {} has neither labels nor a resource filter",
                reference.kind
            )));
        }

        let api = match dynamic_api(ctx, reference, &namespace).await {
            Some(api) => api,
            None => continue,
        };

        if reference.is_wildcard() {
            let mut params = ListParams::default();
            if let Some(selector) = reference.label_selector() {
                params = params.labels(&selector);
            }
            let objects = api.list(&params).await?;
            for object in objects.items {
                if accepts(filter.as_deref(), payload, &object) {
                    annotate(&api, &object.name_any()).await?;
                    annotated += 1;
                }
            }
        } else {
            let object = match api.get(&reference.name).await {
                Ok(object) => object,
                Err(kube::Error::Api(response)) if response.code == 404 => {
                    warn!(
                        kind = %reference.kind,
                        name = %reference.name,
                        "referenced resource not found"
                    );
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            if accepts(filter.as_deref(), payload, &object) {
                annotate(&api, &reference.name).await?;
                annotated += 1;
            }
        }
    }

    Ok(annotated)
}

/// Resolve a reference's kind to a namespaced dynamic API. Unresolvable
/// kinds fail only their own reference.
async fn dynamic_api(
    ctx: &Context,
    reference: &CrossNamespaceObjectReference,
    namespace: &str,
) -> Option<Api<DynamicObject>> {
    let Some(api_version) = reference.api_version.as_deref() else {
        warn!(kind = %reference.kind, "resource reference has no apiVersion, skipping");
        return None;
    };
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    let gvk = GroupVersionKind::gvk(group, version, &reference.kind);

    match kube::discovery::oneshot::pinned_kind(&ctx.client, &gvk).await {
        Ok((resource, _caps)) => Some(Api::namespaced_with(
            ctx.client.clone(),
            namespace,
            &resource,
        )),
        Err(error) => {
            warn!(kind = %reference.kind, %error, "failed to resolve resource kind");
            None
        }
    }
}

/// Evaluate the resource filter for one target. Runtime errors fail the
/// target, not the request.
fn accepts(filter: Option<&Program>, payload: &serde_json::Value, object: &DynamicObject) -> bool {
    let Some(program) = filter else {
        return true;
    };
    let resource = serde_json::to_value(object).unwrap_or_default();
    let scope = beacon_filter::scope([("req", payload.clone()), ("res", resource)]);
    match program.eval_bool(&scope) {
        Ok(accepted) => accepted,
        Err(error) => {
            warn!(object = %object.name_any(), %error, "resource filter failed for target");
            false
        }
    }
}

/// Patch the reconcile-request annotation with a strictly increasing
/// token; downstream controllers re-reconcile when the value changes.
async fn annotate(api: &Api<DynamicObject>, name: &str) -> Result<(), kube::Error> {
    let token = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
    let patch = json!({
        "metadata": {
            "annotations": { RECONCILE_REQUEST_ANNOTATION: token }
        }
    });
    let params = PatchParams::default();
    match api.patch(name, &params, &Patch::Merge(&patch)).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 409 => {
            debug!(name, "annotation patch conflicted, retrying once");
            api.patch(name, &params, &Patch::Merge(&patch)).await?;
            Ok(())
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use kube::Resource;

    fn receiver(spec: serde_json::Value) -> Receiver {
        let mut receiver = Receiver::new("r1", serde_json::from_value(spec).unwrap());
        receiver.meta_mut().namespace = Some("ns1".to_string());
        receiver
    }

    #[tokio::test]
    async fn bare_wildcard_without_filter_is_unsafe() {
        let ctx = testing::context();
        let receiver = receiver(serde_json::json!({
            "type": "generic",
            "secretRef": {"name": "tok"},
            "resources": [{
                "apiVersion": "source.toolkit.fluxcd.io/v1",
                "kind": "Bucket",
                "name": "*"
            }]
        }));
        let err = trigger_targets(&ctx, &receiver, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TargetError::Unsafe(_)));
    }

    #[tokio::test]
    async fn missing_api_version_skips_reference() {
        let ctx = testing::context();
        let receiver = receiver(serde_json::json!({
            "type": "generic",
            "secretRef": {"name": "tok"},
            "resources": [{"kind": "Bucket", "name": "foo"}]
        }));
        // The reference is skipped, which is a success with zero targets.
        let annotated = trigger_targets(&ctx, &receiver, &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(annotated, 0);
    }

    #[test]
    fn filter_runtime_errors_fail_only_the_target() {
        let program = Program::compile("req.missing == 'x'").unwrap();
        let object = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        assert!(!accepts(Some(&program), &serde_json::json!({}), &object));
    }

    #[test]
    fn absent_filter_accepts_everything() {
        let object = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        assert!(accepts(None, &serde_json::json!({}), &object));
    }
}
