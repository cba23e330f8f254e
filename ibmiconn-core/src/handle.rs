//! Connection handle
//!
//! A [`ConnectionHandle`] owns one session to a remote host. It opens the
//! channel, negotiates configuration and server capabilities, watches the
//! channel for drops and tears everything down on [`ConnectionHandle::dispose`].
//!
//! The outcome of [`ConnectionHandle::connect`] is always a
//! [`ConnectionResult`] value. A failed attempt leaves the handle disposed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{ComponentRegistry, ServerSettings};
use crate::config::{ConfigStore, ConnectionConfig};
use crate::error::{HandlerError, TransportError, TransportResult};
use crate::models::Credentials;
use crate::progress::{CancelHandle, MessageKind, ProgressUpdate};
use crate::storage::Storage;
use crate::transport::{CommandOutput, RemoteChannel, Transport};

/// Structured reason for a failed connect attempt or an environment problem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Host or username missing
    InvalidCredentials,
    /// The host rejected the credentials
    AuthFailed,
    /// The host could not be reached
    Unreachable,
    /// The session could not be negotiated
    NegotiationFailed,
    /// The attempt was aborted by the caller
    Cancelled,
    /// Another attempt is already in flight
    AttemptInProgress,
    /// Opening the channel took too long
    Timeout,
    /// The configured home directory does not exist
    HomeDirectoryMissing,
    /// The configured temporary library does not exist
    TempLibraryMissing,
    /// Anything else
    Other(String),
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid_credentials"),
            Self::AuthFailed => write!(f, "auth_failed"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::NegotiationFailed => write!(f, "negotiation_failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::AttemptInProgress => write!(f, "attempt_in_progress"),
            Self::Timeout => write!(f, "timeout"),
            Self::HomeDirectoryMissing => write!(f, "home_directory_missing"),
            Self::TempLibraryMissing => write!(f, "temp_library_missing"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

impl From<&TransportError> for ErrorCode {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Unreachable(_) => Self::Unreachable,
            TransportError::AuthFailed(_) => Self::AuthFailed,
            TransportError::Negotiation(_) => Self::NegotiationFailed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Outcome of one connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResult {
    success: bool,
    detail: Option<String>,
    code: Option<ErrorCode>,
}

impl ConnectionResult {
    /// A successful attempt
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            detail: None,
            code: None,
        }
    }

    /// A failed attempt
    pub fn failure(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
            code: Some(code),
        }
    }

    /// An attempt aborted by the caller
    #[must_use]
    pub fn cancelled() -> Self {
        Self::failure(ErrorCode::Cancelled, "Connection attempt cancelled")
    }

    /// Returns true if the session was established
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Returns the diagnostic detail of a failure
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the structured failure code
    #[must_use]
    pub const fn code(&self) -> Option<&ErrorCode> {
        self.code.as_ref()
    }

    /// Returns true if the attempt failed because the caller cancelled it
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == Some(ErrorCode::Cancelled)
    }
}

/// Receives messages emitted during a connect attempt
pub type MessageCallback = Arc<dyn Fn(MessageKind, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives progress steps of a connect attempt
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handles an environment problem; returns true if it was dealt with
pub type UiErrorHandler = Arc<
    dyn Fn(Arc<ConnectionHandle>, ErrorCode, String) -> BoxFuture<'static, bool> + Send + Sync,
>;

/// Invoked once when a live handle's channel goes away
pub type TimeoutCallback =
    Arc<dyn Fn(Arc<ConnectionHandle>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs after the handle went live, before `connect` returns
pub type ConnectedOperation = Arc<
    dyn Fn(Arc<ConnectionHandle>) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync,
>;

/// Hooks passed to [`ConnectionHandle::connect`]
#[derive(Clone, Default)]
pub struct ConnectCallbacks {
    message: Option<MessageCallback>,
    progress: Option<ProgressCallback>,
    ui_error_handler: Option<UiErrorHandler>,
    timeout_callback: Option<TimeoutCallback>,
    on_connected_operations: Vec<ConnectedOperation>,
    cancel: CancelHandle,
}

impl ConnectCallbacks {
    /// Creates callbacks that do nothing, cancelled through `cancel`
    #[must_use]
    pub fn new(cancel: CancelHandle) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// Sets the message callback
    #[must_use]
    pub fn on_message<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(MessageKind, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.message = Some(Arc::new(move |kind, text| f(kind, text).boxed()));
        self
    }

    /// Sets the progress callback
    #[must_use]
    pub fn on_progress<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ProgressUpdate) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.progress = Some(Arc::new(move |update| f(update).boxed()));
        self
    }

    /// Sets the environment error handler
    #[must_use]
    pub fn on_ui_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ConnectionHandle>, ErrorCode, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.ui_error_handler = Some(Arc::new(move |handle, code, data| {
            f(handle, code, data).boxed()
        }));
        self
    }

    /// Sets the drop callback
    #[must_use]
    pub fn on_timeout<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ConnectionHandle>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.timeout_callback = Some(Arc::new(move |handle| f(handle).boxed()));
        self
    }

    /// Appends an operation to run once the handle is live
    #[must_use]
    pub fn with_connected_operation(mut self, operation: ConnectedOperation) -> Self {
        self.on_connected_operations.push(operation);
        self
    }

    /// Returns the cancellation signal of this attempt
    #[must_use]
    pub const fn cancel(&self) -> &CancelHandle {
        &self.cancel
    }

    async fn report(&self, update: ProgressUpdate) {
        if let Some(progress) = &self.progress {
            progress(update).await;
        }
    }

    async fn notify(&self, kind: MessageKind, text: String) {
        if let Some(message) = &self.message {
            message(kind, text).await;
        }
    }
}

impl std::fmt::Debug for ConnectCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectCallbacks")
            .field("message", &self.message.is_some())
            .field("progress", &self.progress.is_some())
            .field("ui_error_handler", &self.ui_error_handler.is_some())
            .field("timeout_callback", &self.timeout_callback.is_some())
            .field("on_connected_operations", &self.on_connected_operations.len())
            .field("cancel", &self.cancel)
            .finish()
    }
}

#[derive(Default)]
struct HandleState {
    credentials: Option<Credentials>,
    channel: Option<Arc<dyn RemoteChannel>>,
    config: Option<ConnectionConfig>,
    server_settings: Option<ServerSettings>,
    connected_at: Option<DateTime<Utc>>,
    is_reconnect: bool,
}

/// One session to a remote host
pub struct ConnectionHandle {
    id: Uuid,
    transport: Arc<dyn Transport>,
    storage: Arc<Storage>,
    config_store: Arc<dyn ConfigStore>,
    components: Arc<ComponentRegistry>,
    open_timeout: Option<Duration>,
    state: RwLock<HandleState>,
    live: AtomicBool,
    disposed: AtomicBool,
    dropped: AtomicBool,
    drop_claimed: AtomicBool,
    shutdown: Arc<Notify>,
}

impl ConnectionHandle {
    /// Creates a handle that connects through `transport`
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Arc<Storage>,
        config_store: Arc<dyn ConfigStore>,
        components: Arc<ComponentRegistry>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            storage,
            config_store,
            components,
            open_timeout: None,
            state: RwLock::new(HandleState::default()),
            live: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
            drop_claimed: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Limits how long opening the channel may take
    #[must_use]
    pub const fn with_open_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Establishes the session
    ///
    /// Never fails with an error: every outcome, including cancellation, is
    /// reported through the returned [`ConnectionResult`]. When the result is
    /// not successful the handle has been disposed.
    pub async fn connect(
        self: &Arc<Self>,
        credentials: Credentials,
        callbacks: ConnectCallbacks,
        is_reconnect: bool,
        reload_settings: bool,
    ) -> ConnectionResult {
        match self
            .establish(credentials, &callbacks, is_reconnect, reload_settings)
            .await
        {
            Ok(()) => ConnectionResult::ok(),
            Err(failure) => {
                self.dispose().await;
                debug!(
                    id = %self.id,
                    code = ?failure.code(),
                    detail = ?failure.detail(),
                    "Connect attempt failed"
                );
                failure
            }
        }
    }

    async fn establish(
        self: &Arc<Self>,
        credentials: Credentials,
        callbacks: &ConnectCallbacks,
        is_reconnect: bool,
        reload_settings: bool,
    ) -> Result<(), ConnectionResult> {
        if self.is_disposed() {
            return Err(ConnectionResult::failure(
                ErrorCode::Other("disposed".to_string()),
                "Connection handle has already been disposed",
            ));
        }

        credentials
            .validate()
            .map_err(|reason| ConnectionResult::failure(ErrorCode::InvalidCredentials, reason))?;
        let port = credentials.effective_port();
        let credentials = credentials.with_port(port);
        let name = credentials.name.clone();

        {
            let mut state = self.write_state();
            state.credentials = Some(credentials.clone());
            state.is_reconnect = is_reconnect;
        }

        if callbacks.cancel.is_cancelled() {
            return Err(ConnectionResult::cancelled());
        }

        callbacks
            .report(ProgressUpdate::step(
                format!("Connecting to {}:{port}", credentials.host),
                10,
            ))
            .await;

        let channel = tokio::select! {
            biased;
            () = callbacks.cancel.cancelled() => return Err(ConnectionResult::cancelled()),
            opened = self.open_channel(&credentials) => opened?,
        };
        self.write_state().channel = Some(Arc::clone(&channel));

        let (config, server_settings) = tokio::select! {
            biased;
            () = callbacks.cancel.cancelled() => return Err(ConnectionResult::cancelled()),
            negotiated = self.negotiate(&name, channel.as_ref(), callbacks, reload_settings) => negotiated,
        };

        {
            let mut state = self.write_state();
            state.config = Some(config);
            state.server_settings = Some(server_settings);
            state.connected_at = Some(Utc::now());
        }
        self.live.store(true, Ordering::SeqCst);
        self.spawn_drop_detector(channel, callbacks.timeout_callback.clone());

        if !callbacks.on_connected_operations.is_empty() {
            callbacks
                .report(ProgressUpdate::step("Running startup operations", 20))
                .await;
        }
        for operation in &callbacks.on_connected_operations {
            if let Err(err) = operation(Arc::clone(self)).await {
                warn!(connection = %name, error = %err, "Startup operation failed");
            }
        }

        info!(connection = %name, id = %self.id, is_reconnect, "Connection established");
        Ok(())
    }

    async fn open_channel(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn RemoteChannel>, ConnectionResult> {
        let opened = match self.open_timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.open(credentials))
                .await
                .map_err(|_| {
                    ConnectionResult::failure(
                        ErrorCode::Timeout,
                        format!(
                            "Timed out after {}s connecting to {}",
                            limit.as_secs(),
                            credentials.host
                        ),
                    )
                })?,
            None => self.transport.open(credentials).await,
        };
        opened.map_err(|err| ConnectionResult::failure(ErrorCode::from(&err), err.to_string()))
    }

    /// Loads the configuration record and server settings, then checks the
    /// remote environment the configuration points at
    async fn negotiate(
        self: &Arc<Self>,
        name: &str,
        channel: &dyn RemoteChannel,
        callbacks: &ConnectCallbacks,
        reload_settings: bool,
    ) -> (ConnectionConfig, ServerSettings) {
        callbacks
            .report(ProgressUpdate::step("Loading configuration", 10))
            .await;
        let config = self.config_store.get(name);

        let cached = if reload_settings {
            None
        } else {
            self.storage.get_server_settings(name)
        };
        let server_settings = if let Some(cached) = cached {
            debug!(connection = %name, "Using cached server settings");
            cached
        } else {
            callbacks
                .report(ProgressUpdate::step("Checking installed components", 20))
                .await;
            let detected = self.components.detect(channel).await;
            if let Err(err) = self.storage.set_server_settings(name, &detected) {
                warn!(connection = %name, error = %err, "Failed to cache server settings");
            }
            detected
        };

        callbacks
            .report(ProgressUpdate::step("Checking home directory", 20))
            .await;
        self.verify(
            channel,
            callbacks,
            &format!("test -d {}", quote(&config.home_directory)),
            ErrorCode::HomeDirectoryMissing,
            &config.home_directory,
            format!("Home directory {} does not exist", config.home_directory),
        )
        .await;

        callbacks
            .report(ProgressUpdate::step("Checking temporary library", 10))
            .await;
        let temp_library = config.temp_library.to_uppercase();
        self.verify(
            channel,
            callbacks,
            &format!("/QOpenSys/usr/bin/system \"CHKOBJ OBJ(QSYS/{temp_library}) OBJTYPE(*LIB)\""),
            ErrorCode::TempLibraryMissing,
            &temp_library,
            format!("Temporary library {temp_library} does not exist"),
        )
        .await;

        if config.auto_clear_temp_data {
            clear_temp_data(name, channel, &config).await;
        }

        (config, server_settings)
    }

    /// Runs an environment check; a failed check goes to the UI error
    /// handler and becomes a warning if nobody dealt with it
    async fn verify(
        self: &Arc<Self>,
        channel: &dyn RemoteChannel,
        callbacks: &ConnectCallbacks,
        command: &str,
        code: ErrorCode,
        data: &str,
        warning: String,
    ) {
        match channel.run(command).await {
            Ok(output) if output.success() => {}
            Ok(_) => {
                let handled = match &callbacks.ui_error_handler {
                    Some(handler) => handler(Arc::clone(self), code, data.to_string()).await,
                    None => false,
                };
                if !handled {
                    callbacks.notify(MessageKind::Warning, warning).await;
                }
            }
            Err(err) => {
                debug!(command, error = %err, "Environment check skipped");
            }
        }
    }

    fn spawn_drop_detector(
        self: &Arc<Self>,
        channel: Arc<dyn RemoteChannel>,
        callback: Option<TimeoutCallback>,
    ) {
        let handle = Arc::downgrade(self);
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = shutdown.notified() => return,
                () = channel.closed() => {}
            }
            let Some(handle) = handle.upgrade() else {
                return;
            };
            if handle.is_disposed() || handle.dropped.swap(true, Ordering::SeqCst) {
                return;
            }
            handle.live.store(false, Ordering::SeqCst);
            warn!(connection = %handle.name(), id = %handle.id, "Connection dropped");
            if let Some(callback) = callback {
                callback(handle).await;
            }
        });
    }

    /// Tears the session down
    ///
    /// Idempotent and infallible: teardown errors are logged.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.live.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();

        let channel = self.write_state().channel.take();
        if let Some(channel) = channel {
            if let Err(err) = channel.close().await {
                warn!(connection = %self.name(), error = %err, "Failed to close channel");
            }
        }
        debug!(connection = %self.name(), id = %self.id, "Connection handle disposed");
    }

    /// Replaces the negotiated configuration; ignored unless live
    pub fn set_config(&self, config: ConnectionConfig) -> bool {
        if !self.is_live() {
            return false;
        }
        self.write_state().config = Some(config);
        true
    }

    /// Returns the negotiated configuration while live
    #[must_use]
    pub fn config(&self) -> Option<ConnectionConfig> {
        if !self.is_live() {
            return None;
        }
        self.read_state().config.clone()
    }

    /// Runs a command over the live channel
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NotConnected` unless the handle is live, or
    /// the channel's own error.
    pub async fn run(&self, command: &str) -> TransportResult<CommandOutput> {
        let channel = if self.is_live() {
            self.read_state().channel.clone()
        } else {
            None
        };
        match channel {
            Some(channel) => channel.run(command).await,
            None => Err(TransportError::NotConnected),
        }
    }

    /// Returns the unique handle ID
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the connection name, empty before `connect` was called
    #[must_use]
    pub fn name(&self) -> String {
        self.read_state()
            .credentials
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    /// Returns the credentials of the last connect attempt
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.read_state().credentials.clone()
    }

    /// Returns the server settings negotiated at connect time
    #[must_use]
    pub fn server_settings(&self) -> Option<ServerSettings> {
        self.read_state().server_settings.clone()
    }

    /// Returns when the handle went live
    #[must_use]
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.read_state().connected_at
    }

    /// Returns true if this handle was created by a reconnect
    #[must_use]
    pub fn is_reconnect(&self) -> bool {
        self.read_state().is_reconnect
    }

    /// Returns true while the session is established and not dropped
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Marks the loss of this session as handled
    ///
    /// Returns true for the first caller only.
    pub(crate) fn claim_drop(&self) -> bool {
        !self.drop_claimed.swap(true, Ordering::SeqCst)
    }

    /// Returns true once [`dispose`](Self::dispose) ran
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, HandleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, HandleState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("transport", &self.transport.transport_id())
            .field("live", &self.is_live())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

async fn clear_temp_data(name: &str, channel: &dyn RemoteChannel, config: &ConnectionConfig) {
    let commands = [
        format!("rm -rf {}/ibmiconn*", quote(&config.temp_dir)),
        format!(
            "/QOpenSys/usr/bin/system \"CLRLIB LIB({})\"",
            config.temp_library.to_uppercase()
        ),
    ];
    for command in &commands {
        match channel.run(command).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                debug!(connection = %name, command, code = output.code, "Temp data cleanup failed");
            }
            Err(err) => {
                debug!(connection = %name, command, error = %err, "Temp data cleanup skipped");
            }
        }
    }
}

/// Quotes a value for the remote POSIX shell
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
