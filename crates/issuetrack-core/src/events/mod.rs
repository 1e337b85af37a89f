//! Domain events delivered over the push channel.
//!
//! Events are published on the event dispatcher by the realtime client
//! and consumed by the cache invalidator and the notification formatter.

pub mod resource;

pub use resource::{ChangeAction, ResourceChanged, ResourceId};

/// Topic carrying [`ResourceChanged`] payloads.
pub const RESOURCE_CHANGED: &str = "resource-changed";
