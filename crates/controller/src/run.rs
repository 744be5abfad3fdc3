//! Controller wiring: three loops plus dependency watches.

use beacon_api::{Alert, Provider, Receiver};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::runtime::controller::{Action, Config, Controller};
use kube::runtime::finalizer;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{alert, provider, receiver, Context, Error};

/// Namespace-scoped or cluster-wide API depending on the watch settings.
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Unwrap the finalizer combinator's error layers back into [`Error`].
pub(crate) fn map_finalizer_error(err: finalizer::Error<Error>) -> Error {
    match err {
        finalizer::Error::ApplyFailed(err) | finalizer::Error::CleanupFailed(err) => err,
        finalizer::Error::AddFinalizer(err) | finalizer::Error::RemoveFinalizer(err) => {
            Error::Kube(err)
        }
        finalizer::Error::UnnamedObject => Error::MissingMetadata("name"),
        finalizer::Error::InvalidFinalizer => {
            Error::ValidationFailed("invalid finalizer name".to_string())
        }
    }
}

fn error_policy<K>(_object: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action
where
    K: Resource,
{
    warn!(error = %error, "reconcile failed, backing off");
    Action::requeue(Duration::from_secs(30))
}

fn log_result<K>(kind: &str, result: Result<(ObjectRef<K>, Action), impl std::fmt::Display>)
where
    K: Resource + Debug,
    K::DynamicType: Debug + Eq + Hash + Clone,
{
    match result {
        Ok((object, _)) => debug!(kind, object = ?object, "reconciled"),
        Err(error) => warn!(kind, %error, "reconcile dispatch failed"),
    }
}

/// Run the Provider, Alert and Receiver controllers until shutdown.
///
/// Alerts watch their Providers so readiness follows provider changes;
/// Receivers watch Secrets so a token rotation requeues the owner
/// immediately rather than on the next interval tick.
pub async fn controllers(ctx: Arc<Context>) {
    let namespace = ctx.settings.namespace.clone();
    let namespace = namespace.as_deref();
    let config = Config::default().concurrency(ctx.settings.concurrent as u16);

    let providers: Api<Provider> = scoped_api(&ctx.client, namespace);
    let alerts: Api<Alert> = scoped_api(&ctx.client, namespace);
    let receivers: Api<Receiver> = scoped_api(&ctx.client, namespace);
    let secrets: Api<Secret> = scoped_api(&ctx.client, namespace);

    info!(
        watch_scope = namespace.unwrap_or("cluster"),
        concurrent = ctx.settings.concurrent,
        "starting subscription controllers"
    );

    let provider_loop = Controller::new(providers.clone(), watcher::Config::default())
        .with_config(config.clone())
        .shutdown_on_signal()
        .run(provider::reconcile, error_policy, ctx.clone())
        .for_each(|result| async move { log_result("Provider", result) });

    let alert_loop = {
        let controller = Controller::new(alerts, watcher::Config::default());
        let store = controller.store();
        controller
            .with_config(config.clone())
            .watches(providers, watcher::Config::default(), move |provider| {
                let provider_name = provider.name_any();
                let provider_namespace = provider.namespace();
                store
                    .state()
                    .into_iter()
                    .filter(|alert| {
                        alert.spec.provider_ref.name == provider_name
                            && alert.namespace() == provider_namespace
                    })
                    .map(|alert| ObjectRef::from_obj(&*alert))
                    .collect::<Vec<_>>()
            })
            .shutdown_on_signal()
            .run(alert::reconcile, error_policy, ctx.clone())
            .for_each(|result| async move { log_result("Alert", result) })
    };

    let receiver_loop = {
        let controller = Controller::new(receivers, watcher::Config::default());
        let store = controller.store();
        controller
            .with_config(config)
            .watches(secrets, watcher::Config::default(), move |secret| {
                let secret_name = secret.name_any();
                let secret_namespace = secret.namespace();
                store
                    .state()
                    .into_iter()
                    .filter(|receiver| {
                        receiver.spec.secret_ref.name == secret_name
                            && receiver.namespace() == secret_namespace
                    })
                    .map(|receiver| ObjectRef::from_obj(&*receiver))
                    .collect::<Vec<_>>()
            })
            .shutdown_on_signal()
            .run(receiver::reconcile, error_policy, ctx.clone())
            .for_each(|result| async move { log_result("Receiver", result) })
    };

    futures::join!(provider_loop, alert_loop, receiver_loop);
    info!("subscription controllers stopped");
}
