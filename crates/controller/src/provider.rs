//! Provider reconciler: resolves credentials, validates the endpoint and
//! keeps the resolved factory cached for the dispatcher.

use beacon_api::condition::{self, reason};
use beacon_api::{Provider, ProviderStatus};
use beacon_filter::FilterError;
use beacon_notify::{CacheKey, ProviderFactory};
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event as K8sEvent, EventType};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::secrets;
use crate::status;
use crate::{Context, Error, Result, FINALIZER};

const KIND: &str = "Provider";

/// Cache operation under which resolved factories are stored.
pub const CACHE_OPERATION: &str = "notify";

#[instrument(skip(provider, ctx), fields(provider = %status::identity(&*provider)))]
pub async fn reconcile(provider: Arc<Provider>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = provider.name_any();
    let namespace = provider
        .namespace()
        .ok_or(Error::MissingMetadata("namespace"))?;
    let api: Api<Provider> = Api::namespaced(ctx.client.clone(), &namespace);

    let result = finalizer(&api, FINALIZER, provider, |event| async {
        match event {
            FinalizerEvent::Apply(p) => apply(p, &ctx).await,
            FinalizerEvent::Cleanup(p) => cleanup(p, &ctx).await,
        }
    })
    .await
    .map_err(crate::run::map_finalizer_error)?;

    ctx.metrics
        .observe_reconcile(KIND, &name, &namespace, start.elapsed().as_secs_f64());
    Ok(result)
}

async fn apply(provider: Arc<Provider>, ctx: &Context) -> Result<Action> {
    let name = provider.name_any();
    let namespace = provider.namespace().unwrap_or_default();
    let api: Api<Provider> = Api::namespaced(ctx.client.clone(), &namespace);

    ctx.metrics
        .record_suspend(KIND, &name, &namespace, provider.spec.suspend);
    if provider.spec.suspend {
        debug!("provider is suspended, skipping validation");
        return Ok(Action::await_change());
    }

    // Resolve the referenced secret up front; transient store errors
    // propagate and back off, everything else degrades to a condition.
    let secret = match &provider.spec.secret_ref {
        None => secrets::ProviderSecret::default(),
        Some(secret_ref) => {
            match secrets::provider_secret(&ctx.client, &namespace, &secret_ref.name).await {
                Ok(secret) => secret,
                Err(Error::Kube(err)) => return Err(Error::Kube(err)),
                Err(err) => {
                    return not_ready(&api, &provider, ctx, reason::VALIDATION_FAILED, err).await
                }
            }
        }
    };

    let ca_pem = match &provider.spec.cert_secret_ref {
        None => None,
        Some(secret_ref) => {
            match secrets::ca_bundle(&ctx.client, &namespace, &secret_ref.name).await {
                Ok(pem) => Some(pem),
                Err(Error::Kube(err)) => return Err(Error::Kube(err)),
                Err(err) => {
                    return not_ready(&api, &provider, ctx, reason::VALIDATION_FAILED, err).await
                }
            }
        }
    };

    let address = secret
        .address
        .clone()
        .or_else(|| provider.spec.address.clone());

    // Scheme policy applies to whichever address won.
    if ctx.settings.block_insecure_http {
        if let Some(address) = address.as_deref() {
            if let Ok(url) = Url::parse(address) {
                if url.scheme() == "http" {
                    return stalled(
                        &api,
                        &provider,
                        ctx,
                        reason::INSECURE_ADDRESS,
                        "provider address uses the blocked http scheme",
                    )
                    .await;
                }
            }
        }
    }

    // When no secret supplies the address, the spec address must parse.
    if secret.address.is_none() && !provider.spec.type_.has_default_address() {
        match address.as_deref() {
            None => {
                return not_ready(
                    &api,
                    &provider,
                    ctx,
                    reason::VALIDATION_FAILED,
                    Error::ValidationFailed("provider has neither address nor secret".to_string()),
                )
                .await
            }
            // Pub/Sub topics are resource names, not URLs.
            Some(_) if provider.spec.type_ == beacon_api::ProviderType::GooglePubSub => {}
            Some(addr) => {
                if let Err(err) = Url::parse(addr) {
                    return not_ready(
                        &api,
                        &provider,
                        ctx,
                        reason::VALIDATION_FAILED,
                        Error::ValidationFailed(format!("invalid provider address: {err}")),
                    )
                    .await;
                }
            }
        }
    }

    // A commit-status expression that cannot compile never will until the
    // spec changes.
    if let Some(expr) = &provider.spec.commit_status_expr {
        if let Err(err @ FilterError::Parse { .. }) = ctx.programs.get(expr) {
            return stalled(
                &api,
                &provider,
                ctx,
                reason::INVALID_FILTER_EXPRESSION,
                format!("commit status expression rejected: {err}"),
            )
            .await;
        }
    }

    let factory = ProviderFactory {
        address,
        proxy: secret.proxy.or_else(|| provider.spec.proxy.clone()),
        username: secret
            .username
            .or_else(|| provider.spec.username.clone()),
        channel: provider.spec.channel.clone(),
        token: secret.token,
        password: secret.password,
        headers: secret.headers,
        ca_pem,
        provider_uid: provider.meta().uid.clone().unwrap_or_default(),
        timeout: provider.timeout(),
        commit_status_id: None,
    };

    // Probe constructibility so misconfiguration surfaces here instead of
    // at dispatch time. Commit-status types need an id to construct; any
    // placeholder will do for validation.
    let mut probe = factory.clone();
    if provider.spec.type_.is_commit_status() {
        probe.commit_status_id = Some("probe".to_string());
    }
    if let Err(err) = probe.notifier(provider.spec.type_) {
        return not_ready(
            &api,
            &provider,
            ctx,
            reason::VALIDATION_FAILED,
            Error::ValidationFailed(err.to_string()),
        )
        .await;
    }

    ctx.credentials
        .insert(
            CacheKey::new(KIND, &name, &namespace, CACHE_OPERATION),
            factory,
        )
        .await;

    let mut conditions = status::current_conditions(&*provider, |s: &ProviderStatus| &s.conditions);
    condition::clear(&mut conditions, condition::STALLED);
    status::apply_condition(
        &*provider,
        &mut conditions,
        condition::READY,
        true,
        reason::SUCCEEDED,
        "provider validated",
    );
    status::patch(
        &api,
        &name,
        &serde_json::json!({
            "conditions": conditions,
            "observedGeneration": provider.meta().generation,
        }),
    )
    .await?;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, true);

    Ok(Action::requeue(provider.interval()))
}

async fn cleanup(provider: Arc<Provider>, ctx: &Context) -> Result<Action> {
    let name = provider.name_any();
    let namespace = provider.namespace().unwrap_or_default();

    let evicted = ctx.credentials.evict_object(KIND, &name, &namespace).await;
    ctx.metrics.forget(KIND, &name, &namespace);
    info!(evicted, "provider deleted, released cached credentials");
    Ok(Action::await_change())
}

/// Mark the provider not ready and retry shortly.
async fn not_ready(
    api: &Api<Provider>,
    provider: &Provider,
    ctx: &Context,
    reason: &str,
    err: Error,
) -> Result<Action> {
    let name = provider.name_any();
    let namespace = provider.namespace().unwrap_or_default();
    warn!(error = %err, "provider failed validation");

    let mut conditions = status::current_conditions(provider, |s: &ProviderStatus| &s.conditions);
    status::apply_condition(
        provider,
        &mut conditions,
        condition::READY,
        false,
        reason,
        err.to_string(),
    );
    status::patch(api, &name, &serde_json::json!({ "conditions": conditions })).await?;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, false);

    Ok(Action::requeue(Duration::from_secs(30)))
}

/// Mark the provider stalled; no retries until the spec changes.
async fn stalled(
    api: &Api<Provider>,
    provider: &Provider,
    ctx: &Context,
    reason: &str,
    message: impl Into<String>,
) -> Result<Action> {
    let name = provider.name_any();
    let namespace = provider.namespace().unwrap_or_default();
    let message = message.into();
    warn!(%message, "provider is stalled");

    let mut conditions = status::current_conditions(provider, |s: &ProviderStatus| &s.conditions);
    status::apply_condition(
        provider,
        &mut conditions,
        condition::READY,
        false,
        reason,
        message.clone(),
    );
    status::apply_condition(
        provider,
        &mut conditions,
        condition::STALLED,
        true,
        reason,
        message.clone(),
    );
    status::patch(api, &name, &serde_json::json!({ "conditions": conditions })).await?;
    ctx.metrics
        .record_condition(KIND, &name, &namespace, condition::READY, false);

    let event = K8sEvent {
        type_: EventType::Warning,
        reason: reason.to_string(),
        note: Some(message),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(err) = ctx.recorder.publish(&event, &provider.object_ref(&())).await {
        debug!(error = %err, "failed to record stalled event");
    }

    Ok(Action::await_change())
}
