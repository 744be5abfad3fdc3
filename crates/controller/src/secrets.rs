//! Secret resolution for subscriptions.

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::HashMap;
use tracing::warn;

use crate::{Error, Result};

/// Key carrying the receiver token and provider bearer credentials.
pub const TOKEN_KEY: &str = "token";

/// Key carrying a PEM CA bundle.
pub const CA_CERT_KEY: &str = "ca.crt";

/// Pre-1.0 CA key, still accepted.
pub const LEGACY_CA_CERT_KEY: &str = "caFile";

/// Decoded provider secret content. All keys are optional on the wire.
#[derive(Debug, Default, Clone)]
pub struct ProviderSecret {
    pub address: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy: Option<String>,
    pub headers: HashMap<String, String>,
}

async fn get_secret(client: &Client, namespace: &str, name: &str) -> Result<Secret> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    api.get(name).await.map_err(|err| match err {
        kube::Error::Api(ref response) if response.code == 404 => {
            Error::TokenNotFound(format!("secret {namespace}/{name} not found"))
        }
        other => Error::Kube(other),
    })
}

fn utf8_value(secret: &Secret, key: &str) -> Result<Option<String>> {
    let Some(data) = &secret.data else {
        return Ok(None);
    };
    match data.get(key) {
        None => Ok(None),
        Some(bytes) => String::from_utf8(bytes.0.clone())
            .map(|v| Some(v.trim_end_matches('\n').to_string()))
            .map_err(|_| Error::ValidationFailed(format!("secret key {key:?} is not valid UTF-8"))),
    }
}

/// Resolve a provider's secret ref into its optional fields.
///
/// The `headers` key holds a YAML map of extra HTTP headers.
pub async fn provider_secret(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<ProviderSecret> {
    let secret = get_secret(client, namespace, name).await?;

    let headers = match utf8_value(&secret, "headers")? {
        None => HashMap::new(),
        Some(raw) => serde_yaml::from_str::<HashMap<String, String>>(&raw).map_err(|e| {
            Error::ValidationFailed(format!("secret key \"headers\" is not a YAML map: {e}"))
        })?,
    };

    Ok(ProviderSecret {
        address: utf8_value(&secret, "address")?,
        token: utf8_value(&secret, TOKEN_KEY)?,
        username: utf8_value(&secret, "username")?,
        password: utf8_value(&secret, "password")?,
        proxy: utf8_value(&secret, "proxy")?,
        headers,
    })
}

/// Resolve a receiver's token. Missing secret or key is `TokenNotFound`.
pub async fn receiver_token(client: &Client, namespace: &str, name: &str) -> Result<String> {
    let secret = get_secret(client, namespace, name).await?;
    utf8_value(&secret, TOKEN_KEY)?.ok_or_else(|| {
        Error::TokenNotFound(format!("secret {namespace}/{name} has no \"token\" key"))
    })
}

/// Resolve a CA bundle from a cert secret, honoring the legacy key.
pub async fn ca_bundle(client: &Client, namespace: &str, name: &str) -> Result<Vec<u8>> {
    let secret = get_secret(client, namespace, name).await?;
    let data = secret.data.as_ref();

    if let Some(pem) = data.and_then(|d| d.get(CA_CERT_KEY)) {
        return Ok(pem.0.clone());
    }
    if let Some(pem) = data.and_then(|d| d.get(LEGACY_CA_CERT_KEY)) {
        warn!(
            secret = %format!("{namespace}/{name}"),
            "the \"caFile\" secret key is deprecated, rename it to \"ca.crt\""
        );
        return Ok(pem.0.clone());
    }
    Err(Error::ValidationFailed(format!(
        "secret {namespace}/{name} has no \"{CA_CERT_KEY}\" key"
    )))
}
