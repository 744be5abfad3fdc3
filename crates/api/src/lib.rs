//! Custom resource types for the beacon notification core.
//!
//! Three subscription kinds drive the system: [`Provider`] describes an
//! outbound notification endpoint, [`Alert`] binds event sources to a
//! provider, and [`Receiver`] exposes an inbound webhook that triggers
//! reconciliation of target objects. [`Event`] is the wire payload accepted
//! by the event router.
//!
//! The subscription objects are owned by the platform control plane; this
//! crate only defines their Rust representation plus the few derived values
//! (webhook paths, conditions) the controllers publish back to status.

pub mod alert;
pub mod condition;
pub mod duration;
pub mod event;
pub mod provider;
pub mod receiver;
pub mod reference;

pub use alert::{Alert, AlertSpec, AlertStatus};
pub use condition::Condition;
pub use event::{Event, MAX_MESSAGE_LENGTH, SEVERITY_ERROR, SEVERITY_INFO};
pub use provider::{Provider, ProviderSpec, ProviderStatus, ProviderType};
pub use receiver::{Receiver, ReceiverSpec, ReceiverStatus, ReceiverType};
pub use reference::{CrossNamespaceObjectReference, LocalObjectReference};

/// API group of the subscription custom resources.
pub const GROUP: &str = "notification.beacon.dev";

/// API version of the subscription custom resources.
pub const VERSION: &str = "v1";

/// Annotation patched onto target objects to request a reconciliation.
///
/// The legacy `fluxcd.io` key is retained so downstream controllers that
/// predate beacon keep reacting to webhook-triggered requests.
pub const RECONCILE_REQUEST_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";
