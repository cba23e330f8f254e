//! Capability registration
//!
//! This module provides the capability-keyed registry extensions use to plug
//! implementations into the core, and the remote component kind the
//! connection handle uses for server capability detection.

mod component;
mod registry;

pub use component::{
    BashComponent, ComponentRegistry, ComponentState, RemoteComponent, ServerSettings,
    SqlComponent,
};
pub use registry::CapabilityRegistry;
