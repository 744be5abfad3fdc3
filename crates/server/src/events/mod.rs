//! The event router: POST / on the events port.

mod decorate;
mod dispatch;
mod matching;

pub use decorate::decorate;
pub use dispatch::Dispatcher;
pub use matching::matching_alerts;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use beacon_api::{Alert, Event, MAX_MESSAGE_LENGTH, SEVERITY_ERROR, SEVERITY_INFO};
use beacon_controller::Context;
use beacon_ratelimit::RateLimiter;
use kube::runtime::reflector::Store;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::http::{healthz, readyz};
use crate::MAX_BODY_BYTES;

/// Shared state of the event router.
#[derive(Clone)]
pub struct EventServerState {
    pub ctx: Arc<Context>,
    pub alerts: Store<Alert>,
    pub limiter: RateLimiter,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the event router.
pub fn router(state: EventServerState) -> Router {
    Router::new()
        .route("/", post(handle_event))
        .route("/healthz", axum::routing::get(healthz))
        .route("/readyz", axum::routing::get(readyz))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES * 2))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Identity under which duplicate events collapse: the involved object,
/// severity and message, plus the revision/token metadata that distinguish
/// semantically different occurrences.
pub fn rate_limit_key(event: &Event) -> String {
    let mut hasher = Sha256::new();
    let object = &event.involved_object;
    for part in [
        object.api_version.as_deref().unwrap_or_default(),
        object.kind.as_deref().unwrap_or_default(),
        object.namespace.as_deref().unwrap_or_default(),
        object.name.as_deref().unwrap_or_default(),
        event.severity.as_str(),
        event.message.as_str(),
    ] {
        hasher.update(part.as_bytes());
    }
    if let Some(revision) = event.metadata_value("revision") {
        hasher.update(revision.as_bytes());
    }
    if let Some(token) = event.metadata_value("token") {
        hasher.update(token.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn bad_request(state: &EventServerState, message: &str) -> Response {
    state.ctx.metrics.count_http_request("events", 400, "/");
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

/// Accept an event, collapse duplicates and fan out in the background.
///
/// The sender always gets a quick answer: 202 for accepted (including
/// deliberately discarded) events, 400 for malformed bodies, 429 for
/// rate-limited identities. Dispatch failures are reported out-of-band.
async fn handle_event(
    State(state): State<EventServerState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let Ok(body) = body else {
        return bad_request(&state, "failed to read request body");
    };
    if body.len() > MAX_BODY_BYTES {
        return bad_request(&state, "request body exceeds the size limit");
    }

    let mut event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => return bad_request(&state, &format!("invalid event: {err}")),
    };

    let (kind, namespace, name) = {
        let (kind, namespace, name) = event.object_coordinates();
        (kind.to_string(), namespace.to_string(), name.to_string())
    };
    if kind.is_empty() || namespace.is_empty() || name.is_empty() {
        return bad_request(&state, "event is missing involved object coordinates");
    }
    if event.severity != SEVERITY_INFO && event.severity != SEVERITY_ERROR {
        return bad_request(&state, "event severity must be info or error");
    }
    if event.message.is_empty() {
        return bad_request(&state, "event message is empty");
    }
    if event.message.len() > MAX_MESSAGE_LENGTH {
        let mut cut = MAX_MESSAGE_LENGTH;
        while !event.message.is_char_boundary(cut) {
            cut -= 1;
        }
        event.message.truncate(cut);
    }

    let key = rate_limit_key(&event);
    let take = state
        .limiter
        .take(&key, state.ctx.settings.rate_limit_interval)
        .await;
    if !take.allowed {
        debug!(object = %format!("{kind}/{namespace}/{name}"), "duplicate event suppressed");
        state.ctx.metrics.count_http_request("events", 429, "/");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("X-RateLimit-Remaining", "0")],
        )
            .into_response();
    }

    let matched = matching_alerts(&state.ctx, &event, state.alerts.state()).await;
    if matched.is_empty() {
        info!(
            object = %format!("{kind}/{namespace}/{name}"),
            reason = %event.reason,
            "discarding event, no matching alerts"
        );
    } else {
        // The sender is acknowledged before delivery; losses after this
        // point surface as logs, events and metrics only.
        let dispatcher = Arc::clone(&state.dispatcher);
        let event = event.clone();
        tokio::spawn(async move {
            dispatcher.fan_out(event, matched).await;
        });
    }

    state.ctx.metrics.count_http_request("events", 202, "/");
    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use http_body_util::BodyExt;
    use kube::runtime::reflector;
    use tower::ServiceExt;

    fn state() -> EventServerState {
        let ctx = testing::context();
        let (alerts, _writer) = reflector::store::<Alert>();
        EventServerState {
            dispatcher: Arc::new(Dispatcher::new(ctx.clone(), 8)),
            ctx,
            alerts,
            limiter: RateLimiter::new(1),
        }
    }

    fn event_body() -> serde_json::Value {
        serde_json::json!({
            "involvedObject": {
                "apiVersion": "source.toolkit.fluxcd.io/v1",
                "kind": "Bucket",
                "name": "foo",
                "namespace": "ns1"
            },
            "severity": "info",
            "timestamp": "2025-03-01T12:00:00Z",
            "message": "ok",
            "reason": "ReconciliationSucceeded",
            "metadata": {"source.toolkit.fluxcd.io/revision": "abc"},
            "reportingController": "source-controller"
        })
    }

    async fn post_event(router: &Router, body: &serde_json::Value) -> axum::http::Response<axum::body::Body> {
        router
            .clone()
            .oneshot(
                axum::http::Request::post("/")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(serde_json::to_vec(body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let router = router(state());
        let response = router
            .clone()
            .oneshot(
                axum::http::Request::post("/")
                    .body(axum::body::Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn event_without_coordinates_is_rejected() {
        let router = router(state());
        let mut body = event_body();
        body["involvedObject"]["name"] = serde_json::json!("");
        let response = post_event(&router, &body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn discarded_event_still_accepted() {
        // No alerts in the store: the event is discarded but acknowledged.
        let router = router(state());
        let response = post_event(&router, &event_body()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn duplicate_event_is_rate_limited() {
        let router = router(state());
        let body = event_body();

        let first = post_event(&router, &body).await;
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = post_event(&router, &body).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            second
                .headers()
                .get("X-RateLimit-Remaining")
                .and_then(|v| v.to_str().ok()),
            Some("0")
        );

        let collected = second.into_body().collect().await.unwrap();
        assert!(collected.to_bytes().is_empty());
    }

    #[tokio::test]
    async fn distinct_revision_bypasses_the_collapse() {
        let router = router(state());
        let body = event_body();
        assert_eq!(post_event(&router, &body).await.status(), StatusCode::ACCEPTED);

        let mut changed = body.clone();
        changed["metadata"]["source.toolkit.fluxcd.io/revision"] = serde_json::json!("def");
        assert_eq!(
            post_event(&router, &changed).await.status(),
            StatusCode::ACCEPTED
        );
    }

    #[tokio::test]
    async fn oversize_body_is_rejected() {
        let router = router(state());
        let mut body = event_body();
        body["message"] = serde_json::json!("x".repeat(MAX_BODY_BYTES + 1));
        let response = post_event(&router, &body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn key_ignores_unrelated_metadata() {
        let event: Event = serde_json::from_value(event_body()).unwrap();
        let mut other: Event = serde_json::from_value(event_body()).unwrap();
        other
            .metadata
            .as_mut()
            .unwrap()
            .insert("source.toolkit.fluxcd.io/extra".to_string(), "x".to_string());
        assert_eq!(rate_limit_key(&event), rate_limit_key(&other));

        other
            .metadata
            .as_mut()
            .unwrap()
            .insert("source.toolkit.fluxcd.io/revision".to_string(), "zzz".to_string());
        assert_ne!(rate_limit_key(&event), rate_limit_key(&other));
    }
}
