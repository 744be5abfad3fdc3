//! Alert reconciler: readiness follows the referenced provider.

use beacon_api::condition::{self, reason};
use beacon_api::{Alert, AlertStatus, Provider};
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::status;
use crate::{Context, Error, Result, FINALIZER};

const KIND: &str = "Alert";

/// Periodic re-check even without watch triggers.
const REQUEUE_READY: Duration = Duration::from_secs(600);

#[instrument(skip(alert, ctx), fields(alert = %status::identity(&*alert)))]
pub async fn reconcile(alert: Arc<Alert>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = alert.name_any();
    let namespace = alert
        .namespace()
        .ok_or(Error::MissingMetadata("namespace"))?;
    let api: Api<Alert> = Api::namespaced(ctx.client.clone(), &namespace);

    let result = finalizer(&api, FINALIZER, alert, |event| async {
        match event {
            FinalizerEvent::Apply(a) => apply(a, &ctx).await,
            FinalizerEvent::Cleanup(a) => cleanup(a, &ctx).await,
        }
    })
    .await
    .map_err(crate::run::map_finalizer_error)?;

    ctx.metrics
        .observe_reconcile(KIND, &name, &namespace, start.elapsed().as_secs_f64());
    Ok(result)
}

async fn apply(alert: Arc<Alert>, ctx: &Context) -> Result<Action> {
    let name = alert.name_any();
    let namespace = alert.namespace().unwrap_or_default();
    let api: Api<Alert> = Api::namespaced(ctx.client.clone(), &namespace);

    ctx.metrics
        .record_suspend(KIND, &name, &namespace, alert.spec.suspend);
    if alert.spec.suspend {
        debug!("alert is suspended, skipping validation");
        return Ok(Action::await_change());
    }

    if let Err(message) = validate_spec(&alert) {
        return not_ready(&api, &alert, ctx, message).await;
    }

    // Readiness follows the provider; a provider change requeues this
    // alert through the controller's watch.
    let providers: Api<Provider> = Api::namespaced(ctx.client.clone(), &namespace);
    let provider = match providers.get(&alert.spec.provider_ref.name).await {
        Ok(provider) => provider,
        Err(kube::Error::Api(response)) if response.code == 404 => {
            return not_ready(
                &api,
                &alert,
                ctx,
                format!(
                    "provider {}/{} not found",
                    namespace, alert.spec.provider_ref.name
                ),
            )
            .await;
        }
        Err(err) => return Err(err.into()),
    };

    let provider_ready = provider
        .status
        .as_ref()
        .is_some_and(|s| condition::is_ready(&s.conditions));
    if provider.spec.suspend || !provider_ready {
        return not_ready(
            &api,
            &alert,
            ctx,
            format!(
                "provider {}/{} is not ready",
                namespace, alert.spec.provider_ref.name
            ),
        )
        .await;
    }

    let mut conditions = status::current_conditions(&*alert, |s: &AlertStatus| &s.conditions);
    status::apply_condition(
        &*alert,
        &mut conditions,
        condition::READY,
        true,
        reason::SUCCEEDED,
        "provider resolved",
    );
    status::patch(
        &api,
        &name,
        &serde_json::json!({
            "conditions": conditions,
            "observedGeneration": alert.meta().generation,
        }),
    )
    .await?;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, true);

    Ok(Action::requeue(REQUEUE_READY))
}

async fn cleanup(alert: Arc<Alert>, ctx: &Context) -> Result<Action> {
    let name = alert.name_any();
    let namespace = alert.namespace().unwrap_or_default();
    ctx.metrics.forget(KIND, &name, &namespace);
    Ok(Action::await_change())
}

/// Spec checks that do not need the store.
fn validate_spec(alert: &Alert) -> std::result::Result<(), String> {
    if alert.spec.event_sources.is_empty() {
        return Err("alert has no event sources".to_string());
    }
    for source in &alert.spec.event_sources {
        if source.kind.is_empty() {
            return Err("event source has an empty kind".to_string());
        }
        if source.name.is_empty() {
            return Err("event source has an empty name".to_string());
        }
    }
    for pattern in alert
        .spec
        .inclusion_list
        .iter()
        .flatten()
        .chain(alert.spec.exclusion_list.iter().flatten())
    {
        regex::Regex::new(pattern)
            .map_err(|err| format!("invalid message filter regex {pattern:?}: {err}"))?;
    }
    Ok(())
}

async fn not_ready(
    api: &Api<Alert>,
    alert: &Alert,
    ctx: &Context,
    message: String,
) -> Result<Action> {
    let name = alert.name_any();
    let namespace = alert.namespace().unwrap_or_default();
    warn!(%message, "alert is not ready");

    let mut conditions = status::current_conditions(alert, |s: &AlertStatus| &s.conditions);
    status::apply_condition(
        alert,
        &mut conditions,
        condition::READY,
        false,
        reason::VALIDATION_FAILED,
        message,
    );
    status::patch(api, &name, &serde_json::json!({ "conditions": conditions })).await?;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, false);

    Ok(Action::requeue(Duration::from_secs(30)))
}
