//! Test doubles for the collaborators of the core
//!
//! These are used by the unit tests of this crate and by the integration
//! tests under `tests/`, and are handy for hosts that want to drive the
//! orchestrator without a real server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use crate::error::{TransportError, TransportResult};
use crate::handle::ErrorCode;
use crate::models::Credentials;
use crate::progress::{MessageKind, ProgressUpdate};
use crate::prompt::{OpenResources, UserPrompter};
use crate::transport::{CommandOutput, RemoteChannel, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory remote channel
///
/// Every command succeeds with exit code 0 unless a different code was
/// scripted with [`respond`](Self::respond).
#[derive(Debug)]
pub struct MockChannel {
    responses: Mutex<HashMap<String, i32>>,
    commands: Mutex<Vec<String>>,
    fail_commands: AtomicBool,
    fail_close: AtomicBool,
    close_calls: AtomicUsize,
    open: watch::Sender<bool>,
}

impl MockChannel {
    /// Creates an open channel
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (open, _) = watch::channel(true);
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            fail_commands: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            open,
        })
    }

    /// Scripts the exit code of a command
    pub fn respond(&self, command: &str, code: i32) {
        lock(&self.responses).insert(command.to_string(), code);
    }

    /// Makes every command fail to execute
    pub fn fail_commands(&self) {
        self.fail_commands.store(true, Ordering::SeqCst);
    }

    /// Makes `close` report an error
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Simulates the remote end going away
    pub fn drop_connection(&self) {
        self.open.send_replace(false);
    }

    /// Returns true until the channel was closed or dropped
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Returns every command run so far
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Returns how often `close` was called
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteChannel for MockChannel {
    async fn run(&self, command: &str) -> TransportResult<CommandOutput> {
        lock(&self.commands).push(command.to_string());
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(TransportError::CommandFailed(command.to_string()));
        }
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let code = lock(&self.responses).get(command).copied().unwrap_or(0);
        Ok(CommandOutput::with_code(code))
    }

    async fn closed(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| !*open).await;
    }

    async fn close(&self) -> TransportResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.open.send_replace(false);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Close("scripted close failure".to_string()));
        }
        Ok(())
    }
}

/// Scripted result of one [`MockTransport::open`] call
#[derive(Debug)]
pub enum MockOutcome {
    /// Open succeeds with this channel
    Connect(Arc<MockChannel>),
    /// Open fails with this error
    Fail(TransportError),
    /// Open never completes
    Hang,
}

/// Transport whose `open` results are scripted in order
///
/// Once the script is exhausted every `open` succeeds with a fresh channel.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockOutcome>>,
    opened: Mutex<Vec<Arc<MockChannel>>>,
    open_calls: AtomicUsize,
}

impl MockTransport {
    /// Creates a transport with an empty script
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts a successful open and returns the channel it will yield
    pub fn push_channel(&self) -> Arc<MockChannel> {
        let channel = MockChannel::new();
        self.push(MockOutcome::Connect(Arc::clone(&channel)));
        channel
    }

    /// Scripts a failed open
    pub fn push_failure(&self, error: TransportError) {
        self.push(MockOutcome::Fail(error));
    }

    /// Scripts an open that never completes
    pub fn push_hang(&self) {
        self.push(MockOutcome::Hang);
    }

    /// Appends an outcome to the script
    pub fn push(&self, outcome: MockOutcome) {
        lock(&self.script).push_back(outcome);
    }

    /// Returns how often `open` was called
    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Returns every channel handed out, oldest first
    #[must_use]
    pub fn opened(&self) -> Vec<Arc<MockChannel>> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _credentials: &Credentials) -> TransportResult<Arc<dyn RemoteChannel>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.script).pop_front();
        let channel = match outcome {
            Some(MockOutcome::Connect(channel)) => channel,
            Some(MockOutcome::Fail(error)) => return Err(error),
            Some(MockOutcome::Hang) => return std::future::pending().await,
            None => MockChannel::new(),
        };
        lock(&self.opened).push(Arc::clone(&channel));
        Ok(channel)
    }

    fn transport_id(&self) -> &'static str {
        "mock"
    }
}

/// Prompter answering from scripted queues and recording what it was shown
///
/// An exhausted queue answers `false`.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    reconnect_answers: Mutex<VecDeque<bool>>,
    retry_answers: Mutex<VecDeque<bool>>,
    error_answers: Mutex<VecDeque<bool>>,
    reconnect_prompts: AtomicUsize,
    reconnect_gate: Mutex<Option<Arc<Notify>>>,
    retry_prompts: AtomicUsize,
    notices: Mutex<Vec<String>>,
    messages: Mutex<Vec<(MessageKind, String)>>,
    progress: Mutex<Vec<ProgressUpdate>>,
    handled_errors: Mutex<Vec<ErrorCode>>,
}

impl ScriptedPrompter {
    /// Creates a prompter that declines everything
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues an answer to the reconnect question
    pub fn answer_reconnect(&self, answer: bool) {
        lock(&self.reconnect_answers).push_back(answer);
    }

    /// Keeps the reconnect question open until
    /// [`release_reconnect`](Self::release_reconnect) is called
    pub fn hold_reconnect(&self) {
        *lock(&self.reconnect_gate) = Some(Arc::new(Notify::new()));
    }

    /// Lets a held reconnect question be answered
    pub fn release_reconnect(&self) {
        if let Some(gate) = lock(&self.reconnect_gate).take() {
            gate.notify_one();
        }
    }

    /// Queues an answer to the retry question
    pub fn answer_retry(&self, answer: bool) {
        lock(&self.retry_answers).push_back(answer);
    }

    /// Queues an answer for `handle_error`
    pub fn answer_error(&self, answer: bool) {
        lock(&self.error_answers).push_back(answer);
    }

    /// Returns how often the reconnect question was asked
    #[must_use]
    pub fn reconnect_prompts(&self) -> usize {
        self.reconnect_prompts.load(Ordering::SeqCst)
    }

    /// Returns how often the retry question was asked
    #[must_use]
    pub fn retry_prompts(&self) -> usize {
        self.retry_prompts.load(Ordering::SeqCst)
    }

    /// Returns the blocking notices shown
    #[must_use]
    pub fn notices(&self) -> Vec<String> {
        lock(&self.notices).clone()
    }

    /// Returns the messages shown
    #[must_use]
    pub fn messages(&self) -> Vec<(MessageKind, String)> {
        lock(&self.messages).clone()
    }

    /// Returns the progress steps reported
    #[must_use]
    pub fn progress_updates(&self) -> Vec<ProgressUpdate> {
        lock(&self.progress).clone()
    }

    /// Returns the error codes passed to `handle_error`
    #[must_use]
    pub fn handled_errors(&self) -> Vec<ErrorCode> {
        lock(&self.handled_errors).clone()
    }
}

#[async_trait]
impl UserPrompter for ScriptedPrompter {
    async fn confirm_reconnect(&self, _connection_name: &str) -> bool {
        let gate = lock(&self.reconnect_gate).clone();
        self.reconnect_prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        lock(&self.reconnect_answers).pop_front().unwrap_or(false)
    }

    async fn confirm_retry(&self, _connection_name: &str, _detail: &str) -> bool {
        self.retry_prompts.fetch_add(1, Ordering::SeqCst);
        lock(&self.retry_answers).pop_front().unwrap_or(false)
    }

    async fn blocking_notice(&self, text: &str) {
        lock(&self.notices).push(text.to_string());
    }

    async fn message(&self, kind: MessageKind, text: &str) {
        lock(&self.messages).push((kind, text.to_string()));
    }

    async fn progress(&self, update: ProgressUpdate) {
        lock(&self.progress).push(update);
    }

    async fn handle_error(&self, code: &ErrorCode, _data: &str) -> bool {
        lock(&self.handled_errors).push(code.clone());
        lock(&self.error_answers).pop_front().unwrap_or(false)
    }
}

/// Open-resource tracker with a settable list of unsaved resources
#[derive(Debug, Default)]
pub struct StaticResources {
    unsaved: Mutex<Vec<String>>,
}

impl StaticResources {
    /// Creates a tracker with nothing unsaved
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replaces the list of unsaved resources
    pub fn set_unsaved(&self, resources: Vec<String>) {
        *lock(&self.unsaved) = resources;
    }
}

impl OpenResources for StaticResources {
    fn unsaved_resources(&self) -> Vec<String> {
        lock(&self.unsaved).clone()
    }
}
