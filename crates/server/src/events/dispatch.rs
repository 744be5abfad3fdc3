//! Background dispatch of decorated events to providers.

use beacon_api::{Alert, Event, Provider};
use beacon_controller::{provider::CACHE_OPERATION, secrets, Context};
use beacon_notify::{CacheKey, ProviderFactory, Redactor};
use kube::api::Api;
use kube::runtime::events::{Event as K8sEvent, EventType};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::events::decorate;
use crate::retry::RetryPolicy;

/// Fans events out to providers on a bounded worker pool. Delivery is
/// at-most-once: tasks die with the process and are never persisted.
pub struct Dispatcher {
    ctx: Arc<Context>,
    pool: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// `max_in_flight` bounds concurrent deliveries across all events; a
    /// storm blocks on the pool instead of growing unbounded tasks.
    pub fn new(ctx: Arc<Context>, max_in_flight: usize) -> Self {
        Self {
            ctx,
            pool: Arc::new(Semaphore::new(max_in_flight.max(1))),
            retry: RetryPolicy::default(),
        }
    }

    /// Dispatch one event to every matched alert. Each (event, alert)
    /// pair is an independent task; a slow provider stalls only its own
    /// permit.
    pub async fn fan_out(&self, event: Event, alerts: Vec<Arc<Alert>>) {
        for alert in alerts {
            let permit = match Arc::clone(&self.pool).acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore only closes at shutdown.
                Err(_) => return,
            };
            let ctx = Arc::clone(&self.ctx);
            let retry = self.retry.clone();
            let event = event.clone();
            tokio::spawn(async move {
                dispatch_one(ctx, retry, event, alert).await;
                drop(permit);
            });
        }
    }
}

async fn dispatch_one(ctx: Arc<Context>, retry: RetryPolicy, event: Event, alert: Arc<Alert>) {
    let alert_name = alert.name_any();
    let namespace = alert.namespace().unwrap_or_default();

    let providers: Api<Provider> = Api::namespaced(ctx.client.clone(), &namespace);
    let provider = match providers.get(&alert.spec.provider_ref.name).await {
        Ok(provider) => provider,
        Err(error) => {
            warn!(alert = %alert_name, %error, "failed to load provider for dispatch");
            return;
        }
    };
    if provider.spec.suspend {
        debug!(alert = %alert_name, "provider suspended, dropping notification");
        return;
    }

    let mut factory = match resolve_factory(&ctx, &provider).await {
        Ok(factory) => factory,
        Err(error) => {
            report_failure(&ctx, &alert, &Redactor::new(), &error).await;
            return;
        }
    };

    let mut redactor = Redactor::new();
    for secret in [&factory.token, &factory.password] {
        if let Some(secret) = secret {
            redactor.add(secret.clone());
        }
    }

    let decorated = decorate(&event, &alert);

    if provider.spec.type_.is_commit_status() {
        match commit_status_id(&ctx, &provider, &alert, &decorated) {
            Ok(id) => factory.commit_status_id = Some(id),
            Err(error) => {
                report_failure(&ctx, &alert, &redactor, &error).await;
                return;
            }
        }
    }

    let notifier = match factory.notifier(provider.spec.type_) {
        Ok(notifier) => notifier,
        Err(error) => {
            report_failure(&ctx, &alert, &redactor, &error.to_string()).await;
            return;
        }
    };

    // One initial attempt plus bounded retries on transient failures.
    let mut attempt = 0;
    loop {
        match notifier.post(&decorated).await {
            Ok(()) => {
                debug!(
                    alert = %alert_name,
                    provider = %provider.spec.type_,
                    attempt,
                    "notification delivered"
                );
                return;
            }
            Err(error) if error.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay(attempt);
                debug!(
                    alert = %alert_name,
                    provider = %provider.spec.type_,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                report_failure(&ctx, &alert, &redactor, &error.to_string()).await;
                return;
            }
        }
    }
}

/// Resolved credentials for a provider, read through the TTL cache.
async fn resolve_factory(ctx: &Context, provider: &Provider) -> Result<ProviderFactory, String> {
    let name = provider.name_any();
    let namespace = provider.namespace().unwrap_or_default();
    let key = CacheKey::new("Provider", &name, &namespace, CACHE_OPERATION);

    if let Some(cached) = ctx.credentials.get(&key).await {
        return Ok((*cached).clone());
    }

    let secret = match &provider.spec.secret_ref {
        None => secrets::ProviderSecret::default(),
        Some(secret_ref) => secrets::provider_secret(&ctx.client, &namespace, &secret_ref.name)
            .await
            .map_err(|err| format!("failed to resolve provider secret: {err}"))?,
    };
    let ca_pem = match &provider.spec.cert_secret_ref {
        None => None,
        Some(secret_ref) => Some(
            secrets::ca_bundle(&ctx.client, &namespace, &secret_ref.name)
                .await
                .map_err(|err| format!("failed to resolve provider CA: {err}"))?,
        ),
    };

    let factory = ProviderFactory {
        address: secret.address.or_else(|| provider.spec.address.clone()),
        proxy: secret.proxy.or_else(|| provider.spec.proxy.clone()),
        username: secret.username.or_else(|| provider.spec.username.clone()),
        channel: provider.spec.channel.clone(),
        token: secret.token,
        password: secret.password,
        headers: secret.headers,
        ca_pem,
        provider_uid: provider.meta().uid.clone().unwrap_or_default(),
        timeout: provider.timeout(),
        commit_status_id: None,
    };
    let cached = ctx.credentials.insert(key, factory).await;
    Ok((*cached).clone())
}

/// Stable commit-status id: the provider's expression over
/// `{event, alert, provider}`, or `<kind>/<name>/<uid8>`.
fn commit_status_id(
    ctx: &Context,
    provider: &Provider,
    alert: &Alert,
    event: &Event,
) -> Result<String, String> {
    let Some(expr) = provider.spec.commit_status_expr.as_deref() else {
        let uid = provider.meta().uid.clone().unwrap_or_default();
        return Ok(beacon_notify::commit_status::default_id(event, &uid));
    };

    let program = ctx
        .programs
        .get(expr)
        .map_err(|err| format!("commit status expression rejected: {err}"))?;
    let scope = beacon_filter::scope([
        ("event", serde_json::to_value(event).unwrap_or_default()),
        ("alert", serde_json::to_value(alert).unwrap_or_default()),
        ("provider", serde_json::to_value(provider).unwrap_or_default()),
    ]);
    program
        .eval_string(&scope)
        .map_err(|err| format!("commit status expression failed: {err}"))
}

/// Dispatch failures never reach the event emitter; they surface as a
/// redacted log line and a warning event on the alert.
async fn report_failure(ctx: &Context, alert: &Alert, redactor: &Redactor, error: &str) {
    let message = redactor.redact(error);
    warn!(alert = %alert.name_any(), error = %message, "notification dispatch failed");

    let event = K8sEvent {
        type_: EventType::Warning,
        reason: "DispatchFailed".to_string(),
        note: Some(message),
        action: "Dispatch".to_string(),
        secondary: None,
    };
    if let Err(error) = ctx.recorder.publish(&event, &alert.object_ref(&())).await {
        info!(%error, "failed to record dispatch warning");
    }
}
