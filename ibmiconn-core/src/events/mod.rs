//! Event bus
//!
//! Features react to connection lifecycle changes by subscribing handlers
//! here instead of reaching into each other.

mod bus;
mod kind;

pub use bus::{handler, EventBus, EventHandler, FireReport, HandlerFuture, LEGACY_OWNER};
pub use kind::EventKind;
