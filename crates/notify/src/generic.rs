//! The `generic` and `generic-hmac` adapters: POST the JSON-encoded event
//! as-is, optionally signed.

use async_trait::async_trait;
use beacon_api::Event;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::collections::HashMap;

use crate::factory::ProviderFactory;
use crate::{client, Notifier, NotifyError};

#[derive(Debug)]
pub(crate) struct GenericNotifier {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
    /// When set, requests carry `X-Signature: sha256=<hex>` over the body.
    sign_token: Option<String>,
}

impl GenericNotifier {
    pub(crate) fn new(factory: &ProviderFactory, signed: bool) -> Result<Self, NotifyError> {
        let url = factory.require_url()?;
        let sign_token = if signed {
            Some(factory.require_token()?.to_string())
        } else {
            None
        };
        Ok(Self {
            client: factory.client()?,
            url: url.into(),
            headers: factory.headers.clone(),
            sign_token,
        })
    }
}

#[async_trait]
impl Notifier for GenericNotifier {
    async fn post(&self, event: &Event) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(event)
            .map_err(|e| NotifyError::Config(format!("failed to encode event: {e}")))?;

        let mut request = client::with_headers(self.client.post(&self.url), &self.headers)
            .header("Content-Type", "application/json");

        if let Some(token) = &self.sign_token {
            let mut mac = Hmac::<Sha256>::new_from_slice(token.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(&body);
            let signature = hex::encode(mac.finalize().into_bytes());
            request = request.header("X-Signature", format!("sha256={signature}"));
        }

        let response = request.body(body).send().await?;
        client::expect_success("generic", response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn event() -> Event {
        serde_json::from_value(serde_json::json!({
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
            "reportingController": "source-controller"
        }))
        .unwrap()
    }

    fn factory(url: &str) -> ProviderFactory {
        ProviderFactory {
            address: Some(url.to_string()),
            token: Some("s3cret".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn posts_event_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("\"name\":\"foo\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = GenericNotifier::new(&factory(&server.uri()), false).unwrap();
        notifier.post(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn signed_variant_attaches_valid_hmac() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("X-Signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = GenericNotifier::new(&factory(&server.uri()), true).unwrap();
        notifier.post(&event()).await.unwrap();

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let signature = requests[0].headers.get("X-Signature").unwrap();
        let signature = signature.to_str().unwrap().strip_prefix("sha256=").unwrap();

        let mut mac = Hmac::<Sha256>::new_from_slice(b"s3cret").unwrap();
        mac.update(&requests[0].body);
        assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = GenericNotifier::new(&factory(&server.uri()), false).unwrap();
        let err = notifier.post(&event()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
