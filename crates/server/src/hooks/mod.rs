//! The receiver gateway: POST /hook/<digest> on the receiver port.

mod targets;

pub use targets::trigger_targets;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use beacon_api::{condition, Receiver};
use beacon_controller::{secrets, Context};
use beacon_ingest::parse_request;
use beacon_ratelimit::RateLimiter;
use kube::api::Api;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::http::{healthz, readyz};
use crate::MAX_BODY_BYTES;

/// Shared state of the receiver gateway.
#[derive(Clone)]
pub struct GatewayState {
    pub ctx: Arc<Context>,
    pub limiter: RateLimiter,
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/hook/{digest}", post(handle_hook))
        .route("/healthz", axum::routing::get(healthz))
        .route("/readyz", axum::routing::get(readyz))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES * 2))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn respond(state: &GatewayState, status: StatusCode, message: &str) -> Response {
    state
        .ctx
        .metrics
        .count_http_request("hooks", status.as_u16(), "/hook");
    (status, message.to_string()).into_response()
}

/// Authenticate an inbound webhook and annotate the receiver's targets.
///
/// Application-level rejections stay in the 4xx range; 500 is reserved for
/// store failures the caller can neither fix nor work around.
async fn handle_hook(
    State(state): State<GatewayState>,
    Path(digest): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let ctx = &state.ctx;

    let Ok(body) = body else {
        return respond(&state, StatusCode::BAD_REQUEST, "failed to read request body");
    };
    if body.len() > MAX_BODY_BYTES {
        return respond(
            &state,
            StatusCode::BAD_REQUEST,
            "request body exceeds the size limit",
        );
    }

    // The path digest is the capability; nothing else identifies the
    // receiver.
    let path = format!("/hook/{digest}");
    let Some((namespace, name)) = ctx.receiver_index.get(&path).await else {
        debug!(path, "no receiver registered for webhook path");
        return respond(&state, StatusCode::NOT_FOUND, "unknown webhook path");
    };

    let api: Api<Receiver> = Api::namespaced(ctx.client.clone(), &namespace);
    let receiver = match api.get(&name).await {
        Ok(receiver) => receiver,
        Err(kube::Error::Api(response)) if response.code == 404 => {
            // Deleted while the index entry was still draining.
            ctx.receiver_index.remove_path(&path).await;
            return respond(&state, StatusCode::NOT_FOUND, "unknown webhook path");
        }
        Err(error) => {
            warn!(%error, "failed to load receiver");
            return respond(&state, StatusCode::INTERNAL_SERVER_ERROR, "store unavailable");
        }
    };

    let ready = receiver
        .status
        .as_ref()
        .is_some_and(|s| condition::is_ready(&s.conditions));
    if receiver.spec.suspend || !ready {
        return respond(
            &state,
            StatusCode::SERVICE_UNAVAILABLE,
            "receiver is suspended or not ready",
        );
    }

    let take = state
        .limiter
        .take(&digest, ctx.settings.rate_limit_interval)
        .await;
    if !take.allowed {
        debug!(receiver = %format!("{namespace}/{name}"), "webhook rate limited");
        ctx.metrics.count_http_request("hooks", 429, "/hook");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("X-RateLimit-Remaining", "0")],
        )
            .into_response();
    }

    let token = match secrets::receiver_token(&ctx.client, &namespace, &receiver.spec.secret_ref.name)
        .await
    {
        Ok(token) => token,
        Err(error) => {
            // The receiver was ready, so the secret existed; treat loss as
            // a store-level failure.
            warn!(%error, "failed to resolve receiver token");
            return respond(&state, StatusCode::INTERNAL_SERVER_ERROR, "store unavailable");
        }
    };

    let parsed = match parse_request(
        receiver.spec.type_,
        &headers,
        &body,
        &token,
        receiver.spec.events.as_deref(),
    ) {
        Ok(parsed) => parsed,
        Err(error) => {
            info!(
                receiver = %format!("{namespace}/{name}"),
                %error,
                "webhook rejected"
            );
            return respond(&state, error.status(), "webhook validation failed");
        }
    };

    match trigger_targets(ctx, &receiver, &parsed.payload).await {
        Ok(annotated) => {
            info!(
                receiver = %format!("{namespace}/{name}"),
                event = parsed.event.as_deref().unwrap_or_default(),
                annotated,
                "webhook accepted"
            );
            respond(&state, StatusCode::OK, "request accepted")
        }
        Err(error) => {
            warn!(%error, "failed to trigger receiver targets");
            respond(&state, StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use tower::ServiceExt;

    fn state() -> GatewayState {
        GatewayState {
            ctx: testing::context(),
            limiter: RateLimiter::new(1),
        }
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let router = router(state());
        let response = router
            .oneshot(
                axum::http::Request::post(format!("/hook/{}", "a".repeat(64)))
                    .body(axum::body::Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let router = router(state());
        let response = router
            .oneshot(
                axum::http::Request::get("/healthz")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
