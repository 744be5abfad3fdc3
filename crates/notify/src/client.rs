//! Shared HTTP plumbing for the adapters.

use reqwest::{Certificate, Client, Proxy, RequestBuilder};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::NotifyError;

/// Build a client honoring the provider's timeout, proxy and CA pool.
pub(crate) fn build(
    timeout: Duration,
    proxy: Option<&str>,
    ca_pem: Option<&[u8]>,
) -> Result<Client, NotifyError> {
    let mut builder = Client::builder().timeout(timeout).use_rustls_tls();

    if let Some(proxy) = proxy {
        let proxy = Proxy::all(proxy)
            .map_err(|e| NotifyError::Config(format!("invalid proxy address: {e}")))?;
        builder = builder.proxy(proxy);
    }

    if let Some(pem) = ca_pem {
        let cert = Certificate::from_pem(pem)
            .map_err(|e| NotifyError::Config(format!("invalid CA certificate: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| NotifyError::Config(format!("failed to build HTTP client: {e}")))
}

/// Attach caller-configured headers to a request.
pub(crate) fn with_headers(
    mut request: RequestBuilder,
    headers: &HashMap<String, String>,
) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(name, value);
    }
    request
}

/// POST a JSON body and map the response status onto the error taxonomy.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &Client,
    service: &'static str,
    url: &str,
    headers: &HashMap<String, String>,
    body: &B,
) -> Result<(), NotifyError> {
    debug!(service, "posting notification");
    let request = with_headers(client.post(url), headers).json(body);
    let response = request.send().await?;
    expect_success(service, response.status())
}

/// Map a status code to success / terminal / retryable.
pub(crate) fn expect_success(
    service: &'static str,
    status: reqwest::StatusCode,
) -> Result<(), NotifyError> {
    if status.is_success() {
        Ok(())
    } else {
        warn!(service, status = status.as_u16(), "endpoint rejected notification");
        Err(NotifyError::Status {
            service,
            status: status.as_u16(),
        })
    }
}
