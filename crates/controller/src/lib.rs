//! Reconcilers for the subscription custom resources.
//!
//! Three control loops keep Provider, Alert and Receiver objects honest:
//! they resolve references, validate what can be validated up front, set
//! `Ready`/`Reconciling`/`Stalled` conditions, and for receivers derive and
//! publish the opaque webhook path. Referenced Secrets and Providers are
//! watched so a token rotation or provider change requeues its dependents
//! immediately.

pub mod alert;
pub mod context;
pub mod index;
pub mod metrics;
pub mod provider;
pub mod receiver;
pub mod run;
pub mod secrets;
pub mod status;

pub use context::{Context, Settings};
pub use index::ReceiverIndex;
pub use metrics::ControllerMetrics;

use thiserror::Error;

/// Finalizer shared by the subscription kinds.
pub const FINALIZER: &str = "finalizers.notification.beacon.dev";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("token not found: {0}")]
    TokenNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("missing object metadata: {0}")]
    MissingMetadata(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
