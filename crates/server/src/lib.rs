//! The two HTTP services of the notification core.
//!
//! The event router (`events`) accepts platform events, matches them
//! against alerts and fans notifications out to providers; the receiver
//! gateway (`hooks`) turns authenticated inbound webhooks into reconcile
//! requests on target objects. Both share the controller context (caches,
//! settings, metrics) and a process-local rate limit store.

pub mod events;
pub mod hooks;
pub mod http;
pub mod retry;

use beacon_api::Alert;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::runtime::reflector::Store;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Client, Resource};
use tracing::warn;

/// Inbound request bodies above this size are rejected with 400.
pub const MAX_BODY_BYTES: usize = 1 << 20;

pub(crate) fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Start a reflector over alerts and return its read handle.
///
/// The router matches events against this cache instead of listing on
/// every request; the watch keeps it current.
pub fn spawn_alert_store(client: &Client, namespace: Option<&str>) -> Store<Alert> {
    let api: Api<Alert> = scoped_api(client, namespace);
    let (reader, writer) = reflector::store();

    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .applied_objects();
    tokio::spawn(async move {
        futures::pin_mut!(stream);
        while let Some(result) = stream.next().await {
            if let Err(error) = result {
                warn!(%error, "alert watch interrupted, backing off");
            }
        }
    });

    reader
}

#[cfg(test)]
pub(crate) mod testing {
    use beacon_controller::{Context, ControllerMetrics, Settings};
    use kube::client::Body;
    use kube::Client;
    use std::sync::Arc;

    /// A client whose every call answers 404; good enough for handler
    /// paths that must not reach the store.
    pub fn mock_client() -> Client {
        let service = tower::service_fn(|_req: axum::http::Request<Body>| async {
            let body = Body::from(
                serde_json::to_vec(&serde_json::json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "status": "Failure",
                    "reason": "NotFound",
                    "code": 404
                }))
                .unwrap(),
            );
            Ok::<_, std::convert::Infallible>(
                axum::http::Response::builder().status(404).body(body).unwrap(),
            )
        });
        Client::new(service, "default")
    }

    pub fn context() -> Arc<Context> {
        let metrics = ControllerMetrics::new(false).unwrap();
        Arc::new(Context::new(mock_client(), metrics, Settings::default()))
    }
}
