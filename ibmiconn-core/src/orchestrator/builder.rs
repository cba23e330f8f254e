//! Builder for [`ConnectionOrchestrator`]

use std::sync::Arc;
use std::time::Duration;

use crate::capability::ComponentRegistry;
use crate::config::ConfigStore;
use crate::error::{LifecycleError, LifecycleResult};
use crate::events::EventBus;
use crate::handle::ConnectedOperation;
use crate::prompt::{NoOpenResources, OpenResources, UserPrompter};
use crate::storage::Storage;
use crate::transport::Transport;

use super::manager::{Collaborators, ConnectionOrchestrator};

/// Collects the collaborators of a [`ConnectionOrchestrator`]
///
/// Transport, storage, configuration store and prompter are required. The
/// resource tracker defaults to [`NoOpenResources`], the component registry
/// to the built-in components and the event bus to a fresh one.
#[derive(Default)]
pub struct OrchestratorBuilder {
    transport: Option<Arc<dyn Transport>>,
    storage: Option<Arc<Storage>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    prompter: Option<Arc<dyn UserPrompter>>,
    resources: Option<Arc<dyn OpenResources>>,
    components: Option<Arc<ComponentRegistry>>,
    events: Option<Arc<EventBus>>,
    connect_timeout: Option<Duration>,
    connected_operations: Vec<ConnectedOperation>,
}

impl OrchestratorBuilder {
    /// Creates an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport used to open channels
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the storage façade
    #[must_use]
    pub fn storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the configuration façade
    #[must_use]
    pub fn config_store(mut self, config_store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(config_store);
        self
    }

    /// Sets the UI prompter
    #[must_use]
    pub fn prompter(mut self, prompter: Arc<dyn UserPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Sets the open-resource tracker consulted before disconnecting
    #[must_use]
    pub fn resources(mut self, resources: Arc<dyn OpenResources>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Sets the remote component registry
    #[must_use]
    pub fn components(mut self, components: Arc<ComponentRegistry>) -> Self {
        self.components = Some(components);
        self
    }

    /// Shares an existing event bus
    #[must_use]
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Limits how long opening a channel may take
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Adds an operation run by every handle once it is live
    #[must_use]
    pub fn connected_operation(mut self, operation: ConnectedOperation) -> Self {
        self.connected_operations.push(operation);
        self
    }

    /// Builds the orchestrator
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::MissingCollaborator`] naming the first
    /// required collaborator that was not set.
    pub fn build(self) -> LifecycleResult<Arc<ConnectionOrchestrator>> {
        let parts = Collaborators {
            transport: self
                .transport
                .ok_or(LifecycleError::MissingCollaborator("transport"))?,
            storage: self
                .storage
                .ok_or(LifecycleError::MissingCollaborator("storage"))?,
            config_store: self
                .config_store
                .ok_or(LifecycleError::MissingCollaborator("config store"))?,
            prompter: self
                .prompter
                .ok_or(LifecycleError::MissingCollaborator("prompter"))?,
            resources: self
                .resources
                .unwrap_or_else(|| Arc::new(NoOpenResources)),
            components: self
                .components
                .unwrap_or_else(|| Arc::new(ComponentRegistry::with_defaults())),
            events: self.events.unwrap_or_default(),
            connect_timeout: self.connect_timeout,
            connected_operations: self.connected_operations,
        };
        Ok(ConnectionOrchestrator::assemble(parts))
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("transport", &self.transport.as_ref().map(|t| t.transport_id()))
            .field("storage", &self.storage.is_some())
            .field("config_store", &self.config_store.is_some())
            .field("prompter", &self.prompter.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
