//! Receiver reconciler: resolves the token, derives the webhook path and
//! keeps the gateway index in step.

use beacon_api::condition::{self, reason};
use beacon_api::{receiver, Receiver, ReceiverStatus};
use beacon_filter::FilterError;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event as K8sEvent, EventType};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::secrets;
use crate::status;
use crate::{Context, Error, Result, FINALIZER};

const KIND: &str = "Receiver";

#[instrument(skip(receiver, ctx), fields(receiver = %status::identity(&*receiver)))]
pub async fn reconcile(receiver: Arc<Receiver>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = receiver.name_any();
    let namespace = receiver
        .namespace()
        .ok_or(Error::MissingMetadata("namespace"))?;
    let api: Api<Receiver> = Api::namespaced(ctx.client.clone(), &namespace);

    let result = finalizer(&api, FINALIZER, receiver, |event| async {
        match event {
            FinalizerEvent::Apply(r) => apply(r, &ctx).await,
            FinalizerEvent::Cleanup(r) => cleanup(r, &ctx).await,
        }
    })
    .await
    .map_err(crate::run::map_finalizer_error)?;

    ctx.metrics
        .observe_reconcile(KIND, &name, &namespace, start.elapsed().as_secs_f64());
    Ok(result)
}

async fn apply(receiver: Arc<Receiver>, ctx: &Context) -> Result<Action> {
    let name = receiver.name_any();
    let namespace = receiver.namespace().unwrap_or_default();
    let api: Api<Receiver> = Api::namespaced(ctx.client.clone(), &namespace);

    ctx.metrics
        .record_suspend(KIND, &name, &namespace, receiver.spec.suspend);
    if receiver.spec.suspend {
        // The published path stays in place; the gateway answers 503 for
        // suspended receivers.
        debug!("receiver is suspended, skipping validation");
        return Ok(Action::await_change());
    }

    if let Err(message) = validate_spec(&receiver) {
        return not_ready(&api, &receiver, ctx, reason::VALIDATION_FAILED, message).await;
    }

    // An unparseable filter expression cannot recover without a spec edit.
    if let Some(expr) = &receiver.spec.resource_filter {
        if let Err(err @ FilterError::Parse { .. }) = ctx.programs.get(expr) {
            return stalled(&api, &receiver, ctx, format!("resource filter rejected: {err}"))
                .await;
        }
    }

    let token =
        match secrets::receiver_token(&ctx.client, &namespace, &receiver.spec.secret_ref.name)
            .await
        {
            Ok(token) => token,
            Err(Error::Kube(err)) => return Err(Error::Kube(err)),
            Err(err) => {
                return not_ready(&api, &receiver, ctx, reason::TOKEN_NOT_FOUND, err.to_string())
                    .await
            }
        };

    let path = receiver::webhook_path(&token, &name, &namespace);

    // Token rotation rotates the URL; retire the superseded path.
    if let Some(previous) = receiver.published_path() {
        if previous != path {
            info!("receiver token changed, webhook path rotated");
            ctx.receiver_index.remove_path(previous).await;
        }
    }

    let mut conditions =
        status::current_conditions(&*receiver, |s: &ReceiverStatus| &s.conditions);
    condition::clear(&mut conditions, condition::STALLED);
    status::apply_condition(
        &*receiver,
        &mut conditions,
        condition::READY,
        true,
        reason::SUCCEEDED,
        "receiver initialized",
    );
    status::patch(
        &api,
        &name,
        &serde_json::json!({
            "webhookPath": path,
            "conditions": conditions,
            "observedGeneration": receiver.meta().generation,
        }),
    )
    .await?;

    ctx.receiver_index.insert(&path, &namespace, &name).await;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, true);

    Ok(Action::requeue(receiver.interval()))
}

async fn cleanup(receiver: Arc<Receiver>, ctx: &Context) -> Result<Action> {
    let name = receiver.name_any();
    let namespace = receiver.namespace().unwrap_or_default();

    ctx.receiver_index.remove_receiver(&namespace, &name).await;
    ctx.metrics.forget(KIND, &name, &namespace);
    info!("receiver deleted, webhook path retired");
    Ok(Action::await_change())
}

fn validate_spec(receiver: &Receiver) -> std::result::Result<(), String> {
    if receiver.spec.resources.is_empty() {
        return Err("receiver has no resource references".to_string());
    }
    for resource in &receiver.spec.resources {
        if resource.kind.is_empty() {
            return Err("resource reference has an empty kind".to_string());
        }
        if resource.name.is_empty() {
            return Err("resource reference has an empty name".to_string());
        }
    }
    Ok(())
}

async fn not_ready(
    api: &Api<Receiver>,
    receiver: &Receiver,
    ctx: &Context,
    reason: &str,
    message: String,
) -> Result<Action> {
    let name = receiver.name_any();
    let namespace = receiver.namespace().unwrap_or_default();
    warn!(%message, "receiver is not ready");

    let mut conditions = status::current_conditions(receiver, |s: &ReceiverStatus| &s.conditions);
    status::apply_condition(
        receiver,
        &mut conditions,
        condition::READY,
        false,
        reason,
        message,
    );
    status::patch(api, &name, &serde_json::json!({ "conditions": conditions })).await?;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, false);

    Ok(Action::requeue(Duration::from_secs(30)))
}

async fn stalled(
    api: &Api<Receiver>,
    receiver: &Receiver,
    ctx: &Context,
    message: String,
) -> Result<Action> {
    let name = receiver.name_any();
    let namespace = receiver.namespace().unwrap_or_default();
    warn!(%message, "receiver is stalled");

    let mut conditions = status::current_conditions(receiver, |s: &ReceiverStatus| &s.conditions);
    status::apply_condition(
        receiver,
        &mut conditions,
        condition::READY,
        false,
        reason::INVALID_FILTER_EXPRESSION,
        message.clone(),
    );
    status::apply_condition(
        receiver,
        &mut conditions,
        condition::STALLED,
        true,
        reason::INVALID_FILTER_EXPRESSION,
        message.clone(),
    );
    status::patch(api, &name, &serde_json::json!({ "conditions": conditions })).await?;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, false);

    let event = K8sEvent {
        type_: EventType::Warning,
        reason: reason::INVALID_FILTER_EXPRESSION.to_string(),
        note: Some(message),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(err) = ctx.recorder.publish(&event, &receiver.object_ref(&())).await {
        debug!(error = %err, "failed to record stalled event");
    }

    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_receiver(value: serde_json::Value) -> Receiver {
        Receiver::new("r1", serde_json::from_value(value).unwrap())
    }

    #[test]
    fn resource_references_validated() {
        let ok = make_receiver(serde_json::json!({
            "type": "generic",
            "secretRef": {"name": "tok"},
            "resources": [{"kind": "Bucket", "name": "*"}]
        }));
        assert!(validate_spec(&ok).is_ok());

        let empty = make_receiver(serde_json::json!({
            "type": "generic",
            "secretRef": {"name": "tok"},
            "resources": []
        }));
        assert!(validate_spec(&empty).is_err());

        let blank_kind = make_receiver(serde_json::json!({
            "type": "generic",
            "secretRef": {"name": "tok"},
            "resources": [{"kind": "", "name": "x"}]
        }));
        assert!(validate_spec(&blank_kind).is_err());
    }

    #[test]
    fn path_derivation_is_idempotent() {
        // Unchanged spec and token always produce the same path.
        let a = receiver::webhook_path("s3cret", "r1", "ns1");
        let b = receiver::webhook_path("s3cret", "r1", "ns1");
        assert_eq!(a, b);
    }
}
