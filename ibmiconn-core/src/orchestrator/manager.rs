//! Connection orchestrator
//!
//! Owns the current [`ConnectionHandle`] and drives the connect, reconnect
//! and disconnect protocol around it. Every transition that changes the
//! current handle is persisted through the storage façade before the
//! matching event is fired on the [`EventBus`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capability::ComponentRegistry;
use crate::config::{ConfigStore, ConnectionConfig};
use crate::error::{ConfigResult, LifecycleError, LifecycleResult, Result};
use crate::events::{EventBus, EventHandler, EventKind, FireReport};
use crate::handle::{ConnectCallbacks, ConnectedOperation, ConnectionHandle, ConnectionResult, ErrorCode};
use crate::progress::CancelHandle;
use crate::prompt::{OpenResources, UserPrompter};
use crate::storage::Storage;
use crate::transport::Transport;

use super::builder::OrchestratorBuilder;
use super::state::{ConnectOptions, LifecycleState};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the orchestrator is assembled from
pub(super) struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub storage: Arc<Storage>,
    pub config_store: Arc<dyn ConfigStore>,
    pub prompter: Arc<dyn UserPrompter>,
    pub resources: Arc<dyn OpenResources>,
    pub components: Arc<ComponentRegistry>,
    pub events: Arc<EventBus>,
    pub connect_timeout: Option<Duration>,
    pub connected_operations: Vec<ConnectedOperation>,
}

/// Owns the current connection and its lifecycle
pub struct ConnectionOrchestrator {
    transport: Arc<dyn Transport>,
    storage: Arc<Storage>,
    config_store: Arc<dyn ConfigStore>,
    prompter: Arc<dyn UserPrompter>,
    resources: Arc<dyn OpenResources>,
    components: Arc<ComponentRegistry>,
    events: Arc<EventBus>,
    connect_timeout: Option<Duration>,
    connected_operations: Vec<ConnectedOperation>,
    /// Never held across an await point
    current: Mutex<Option<Arc<ConnectionHandle>>>,
    state: watch::Sender<LifecycleState>,
    /// Held for the whole of a connect attempt (including retries) or teardown
    attempt: tokio::sync::Mutex<()>,
    active_cancel: Mutex<Option<CancelHandle>>,
    this: Weak<Self>,
}

impl ConnectionOrchestrator {
    /// Starts building an orchestrator
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub(super) fn assemble(parts: Collaborators) -> Arc<Self> {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Arc::new_cyclic(|this| Self {
            transport: parts.transport,
            storage: parts.storage,
            config_store: parts.config_store,
            prompter: parts.prompter,
            resources: parts.resources,
            components: parts.components,
            events: parts.events,
            connect_timeout: parts.connect_timeout,
            connected_operations: parts.connected_operations,
            current: Mutex::new(None),
            state,
            attempt: tokio::sync::Mutex::new(()),
            active_cancel: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Loads the storage and configuration façades
    ///
    /// # Errors
    ///
    /// Returns an error if either backing medium cannot be read.
    pub async fn load(&self) -> Result<()> {
        self.storage.load().await?;
        self.config_store.load().await?;
        debug!(
            storage = self.storage.backend_id(),
            config = self.config_store.backend_id(),
            "Façades loaded"
        );
        Ok(())
    }

    // ========== Connect ==========

    /// Connects with the given options
    ///
    /// On success the new handle becomes current, replacing (and disposing)
    /// any previous one, and `connected` is fired. A handle whose session is
    /// lost before it becomes current goes through the drop protocol instead
    /// and `connected` is not fired for it. A call made while another
    /// attempt is in flight is rejected with [`ErrorCode::AttemptInProgress`].
    pub async fn connect(&self, options: ConnectOptions) -> ConnectionResult {
        let (result, installed) = {
            let Ok(attempt) = self.attempt.try_lock() else {
                warn!(
                    connection = %options.credentials.name,
                    "Connect rejected, another attempt is in progress"
                );
                return ConnectionResult::failure(
                    ErrorCode::AttemptInProgress,
                    "A connection attempt is already in progress",
                );
            };
            let outcome = self.run_attempt(options).await;
            drop(attempt);
            outcome
        };

        match installed {
            Some(handle) if !handle.is_live() => {
                // The drop detector may have reported this handle before it
                // was current
                self.handle_drop(handle).boxed().await;
            }
            Some(_) => {
                self.events.fire(EventKind::Connected).await;
            }
            None => {}
        }
        result
    }

    /// Raises the cancel signal of the in-flight attempt, if any
    pub fn cancel_connect(&self) -> bool {
        match lock(&self.active_cancel).as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs the attempt loop; on success also returns the installed handle
    async fn run_attempt(
        &self,
        options: ConnectOptions,
    ) -> (ConnectionResult, Option<Arc<ConnectionHandle>>) {
        let ConnectOptions {
            credentials,
            reconnect_on_failure,
            is_reconnect,
            reload_settings,
            cancel,
        } = options;
        let name = credentials.name.clone();

        *lock(&self.active_cancel) = Some(cancel.clone());
        self.set_state(LifecycleState::Connecting);
        info!(connection = %name, is_reconnect, "Connecting");

        let (result, installed) = loop {
            let handle = self.new_handle();
            let result = handle
                .connect(
                    credentials.clone(),
                    self.callbacks(&cancel),
                    is_reconnect,
                    reload_settings,
                )
                .await;

            if result.success() {
                self.install(Arc::clone(&handle)).await;
                break (result, Some(handle));
            }

            warn!(
                connection = %name,
                code = ?result.code(),
                detail = ?result.detail(),
                "Connection attempt failed"
            );
            if result.is_cancelled() || !reconnect_on_failure {
                break (result, None);
            }
            let detail = result.detail().unwrap_or_default().to_string();
            if !self.prompter.confirm_retry(&name, &detail).await {
                break (result, None);
            }
            if cancel.is_cancelled() {
                break (ConnectionResult::cancelled(), None);
            }
            info!(connection = %name, "Retrying connection");
        };

        *lock(&self.active_cancel) = None;
        if !result.success() {
            match self.connection() {
                Some(previous) if previous.is_live() => self.set_state(LifecycleState::Connected),
                // A lost handle is still current until its teardown runs
                Some(_) => self.set_state(LifecycleState::Disconnecting),
                None => self.set_state(LifecycleState::Idle),
            }
        }
        (result, installed)
    }

    fn new_handle(&self) -> Arc<ConnectionHandle> {
        Arc::new(
            ConnectionHandle::new(
                Arc::clone(&self.transport),
                Arc::clone(&self.storage),
                Arc::clone(&self.config_store),
                Arc::clone(&self.components),
            )
            .with_open_timeout(self.connect_timeout),
        )
    }

    fn callbacks(&self, cancel: &CancelHandle) -> ConnectCallbacks {
        let messages = Arc::clone(&self.prompter);
        let progress = Arc::clone(&self.prompter);
        let errors = Arc::clone(&self.prompter);
        let this = self.this.clone();

        let mut callbacks = ConnectCallbacks::new(cancel.clone())
            .on_message(move |kind, text| {
                let prompter = Arc::clone(&messages);
                async move { prompter.message(kind, &text).await }
            })
            .on_progress(move |update| {
                let prompter = Arc::clone(&progress);
                async move { prompter.progress(update).await }
            })
            .on_ui_error(move |_, code, data| {
                let prompter = Arc::clone(&errors);
                async move { prompter.handle_error(&code, &data).await }
            })
            .on_timeout(move |handle| {
                let this = this.clone();
                async move {
                    if let Some(orchestrator) = this.upgrade() {
                        orchestrator.handle_drop(handle).await;
                    }
                }
            });
        for operation in &self.connected_operations {
            callbacks = callbacks.with_connected_operation(Arc::clone(operation));
        }
        callbacks
    }

    /// Makes `handle` current; the previous handle is disposed first
    async fn install(&self, handle: Arc<ConnectionHandle>) {
        let previous = lock(&self.current).take();
        if let Some(previous) = previous {
            debug!(connection = %previous.name(), "Disposing replaced connection");
            previous.dispose().await;
        }

        let name = handle.name();
        *lock(&self.current) = Some(handle);

        // Recording the connection reads the stored list first
        if let Err(err) = self.storage.load().await {
            warn!(connection = %name, error = %err, "Failed to load storage");
        }
        self.storage.set_connection_name(Some(name.clone()));
        if let Err(err) = self.storage.set_last_connection(&name) {
            warn!(connection = %name, error = %err, "Failed to record last connection");
        }
        if let Err(err) = self.storage.save().await {
            warn!(connection = %name, error = %err, "Failed to save storage");
        }

        self.set_state(LifecycleState::Connected);
        info!(connection = %name, "Connected");
    }

    // ========== Drop ==========

    fn handle_drop(&self, dropped: Arc<ConnectionHandle>) -> BoxFuture<'_, ()> {
        async move {
            if !self.is_current(&dropped) {
                debug!(connection = %dropped.name(), "Ignoring drop of a replaced connection");
                return;
            }
            if !dropped.claim_drop() {
                return;
            }

            let name = dropped.name();
            warn!(connection = %name, "Connection lost");

            if self.prompter.confirm_reconnect(&name).await {
                if let Some(credentials) = dropped.credentials() {
                    let options = ConnectOptions::new(credentials)
                        .reconnect_on_failure(true)
                        .reconnect(true);
                    let result = self.connect(options).await;
                    if result.success() || result.code() == Some(&ErrorCode::AttemptInProgress) {
                        return;
                    }
                }
            }

            let attempt = self.attempt.lock().await;
            if !self.is_current(&dropped) {
                return;
            }
            self.teardown().await;
            drop(attempt);
            self.events.fire(EventKind::Disconnected).await;
        }
        .boxed()
    }

    fn is_current(&self, handle: &Arc<ConnectionHandle>) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    // ========== Disconnect ==========

    /// Disconnects the current connection
    ///
    /// An in-flight connect attempt is cancelled first. Does nothing when
    /// there is no current connection.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnsavedResources`] and leaves the connection
    /// untouched while resources backed by it have unsaved changes.
    pub async fn disconnect(&self) -> LifecycleResult<()> {
        self.cancel_connect();
        let attempt = self.attempt.lock().await;

        if lock(&self.current).is_none() {
            debug!("Disconnect requested without a current connection");
            return Ok(());
        }

        let unsaved = self.resources.unsaved_resources();
        if !unsaved.is_empty() {
            let err = LifecycleError::UnsavedResources(unsaved);
            warn!(error = %err, "Disconnect refused");
            drop(attempt);
            self.prompter.blocking_notice(&err.to_string()).await;
            return Err(err);
        }

        self.teardown().await;
        drop(attempt);
        self.events.fire(EventKind::Disconnected).await;
        Ok(())
    }

    /// Disposes the current handle and clears the storage pointer
    async fn teardown(&self) {
        self.set_state(LifecycleState::Disconnecting);

        let handle = lock(&self.current).take();
        if let Some(handle) = handle {
            handle.dispose().await;
            info!(connection = %handle.name(), "Disconnected");
        }

        self.storage.set_connection_name(None);
        if let Err(err) = self.storage.save().await {
            warn!(error = %err, "Failed to save storage");
        }

        self.set_state(LifecycleState::Idle);
    }

    // ========== Configuration ==========

    /// Stores a configuration record and applies it to the current
    /// connection if it belongs to it
    ///
    /// # Errors
    ///
    /// Returns an error if the record is invalid or cannot be saved.
    pub async fn update_config(&self, config: ConnectionConfig) -> ConfigResult<()> {
        self.config_store.update(config.clone()).await?;
        self.config_store.save().await?;
        if let Some(handle) = self.connection() {
            if handle.name() == config.name {
                handle.set_config(config);
            }
        }
        Ok(())
    }

    // ========== Events ==========

    /// Registers an event handler
    pub fn subscribe(
        &self,
        owner: &str,
        kind: EventKind,
        name: &str,
        handler: EventHandler,
        transient: bool,
    ) {
        self.events.subscribe(owner, kind, name, handler, transient);
    }

    /// Registers an event handler through the legacy callback API
    pub fn on_event(&self, kind: EventKind, handler: EventHandler) -> String {
        self.events.on_event(kind, handler)
    }

    /// Fires an event
    pub async fn fire(&self, kind: EventKind) -> FireReport {
        self.events.fire(kind).await
    }

    // ========== Accessors ==========

    /// Returns the current connection handle
    #[must_use]
    pub fn connection(&self) -> Option<Arc<ConnectionHandle>> {
        lock(&self.current).clone()
    }

    /// Returns the configuration of the current connection
    #[must_use]
    pub fn config(&self) -> Option<ConnectionConfig> {
        self.connection().and_then(|handle| handle.config())
    }

    /// Returns the storage façade
    #[must_use]
    pub const fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Returns the configuration façade
    #[must_use]
    pub const fn config_store(&self) -> &Arc<dyn ConfigStore> {
        &self.config_store
    }

    /// Returns the event bus
    #[must_use]
    pub const fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Returns the remote component registry
    #[must_use]
    pub const fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    /// Returns the lifecycle state
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Returns a receiver notified on every lifecycle state change
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Lifecycle state changed");
        }
    }
}

impl std::fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("state", &self.state())
            .field("transport", &self.transport.transport_id())
            .field("connection", &self.connection().map(|h| h.name()))
            .finish_non_exhaustive()
    }
}
