//! Shared state for the control loops and servers.

use beacon_filter::ProgramCache;
use beacon_notify::{ProviderFactory, TokenCache};
use kube::runtime::events::{Recorder, Reporter};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::index::ReceiverIndex;
use crate::metrics::ControllerMetrics;

/// Runtime toggles, sourced from flags on the binary.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Reject references whose namespace differs from the referrer's.
    pub no_cross_namespace_refs: bool,
    /// Treat plain-HTTP provider addresses as terminally invalid.
    pub block_insecure_http: bool,
    /// Namespace to watch; `None` watches the whole cluster.
    pub namespace: Option<String>,
    /// Concurrent reconciles per controller.
    pub concurrent: usize,
    /// Interval for collapsing duplicate events.
    pub rate_limit_interval: Duration,
    /// Capacity of the resolved-credential cache.
    pub token_cache_size: usize,
    /// TTL of resolved-credential cache entries.
    pub token_cache_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            no_cross_namespace_refs: false,
            block_insecure_http: false,
            namespace: None,
            concurrent: 4,
            rate_limit_interval: Duration::from_secs(300),
            token_cache_size: 100,
            token_cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Context handed to every reconcile call and shared with the servers.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub recorder: Recorder,
    pub metrics: Arc<ControllerMetrics>,
    pub settings: Settings,
    /// Resolved provider credentials, evicted by the provider finalizer.
    pub credentials: Arc<TokenCache<ProviderFactory>>,
    /// Webhook path to receiver lookups for the gateway.
    pub receiver_index: Arc<ReceiverIndex>,
    /// Compiled filter and commit-status expressions.
    pub programs: Arc<ProgramCache>,
}

impl Context {
    /// Build a context around a client with the given settings.
    pub fn new(client: Client, metrics: Arc<ControllerMetrics>, settings: Settings) -> Self {
        let reporter = Reporter {
            controller: "beacon-controller".into(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            metrics,
            credentials: Arc::new(TokenCache::new(
                settings.token_cache_size,
                settings.token_cache_ttl,
            )),
            receiver_index: Arc::new(ReceiverIndex::default()),
            programs: Arc::new(ProgramCache::default()),
            settings,
        }
    }
}
