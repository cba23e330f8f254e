//! Property-based tests for the connection orchestrator
//!
//! The orchestrator is driven against the scripted transport and prompter
//! from `ibmiconn_core::testing`; subscribers count the events it fires.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use ibmiconn_core::testing::{MockTransport, ScriptedPrompter, StaticResources};
use ibmiconn_core::{
    handler, CancelHandle, ConnectOptions, ConnectionHandle, ConnectionOrchestrator,
    Credentials, ErrorCode, EventHandler, EventKind, HandlerError, JsonFileBackend,
    LifecycleError, LifecycleState, MemoryBackend, MemoryConfigStore, OrchestratorBuilder,
    Storage, TransportError,
};
use proptest::prelude::*;
use tempfile::TempDir;

// ========== Generators ==========

/// Strategy for generating connection names
fn arb_connection_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}".prop_map(String::from)
}

/// Strategy for generating hostnames
fn arb_hostname() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{3,10}\\.[a-z]{2,4}".prop_map(String::from),
        "10\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}".prop_map(String::from),
    ]
}

/// Strategy for generating errors a transport may fail to open with
fn arb_open_error() -> impl Strategy<Value = TransportError> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(TransportError::Unreachable),
        "[a-z ]{1,20}".prop_map(TransportError::AuthFailed),
        "[a-z ]{1,20}".prop_map(TransportError::Negotiation),
    ]
}

// ========== Fixture ==========

struct Fixture {
    transport: Arc<MockTransport>,
    prompter: Arc<ScriptedPrompter>,
    resources: Arc<StaticResources>,
    storage: Arc<Storage>,
    orchestrator: Arc<ConnectionOrchestrator>,
    connected: Arc<AtomicUsize>,
    disconnected: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        Self::with(Storage::new(Arc::new(MemoryBackend::new())), |builder, _| builder)
    }

    /// Builds a fixture over `storage`; `configure` may script the transport
    /// and extend the builder
    fn with(
        storage: Storage,
        configure: impl FnOnce(OrchestratorBuilder, &Arc<MockTransport>) -> OrchestratorBuilder,
    ) -> Self {
        let transport = MockTransport::new();
        let prompter = ScriptedPrompter::new();
        let resources = StaticResources::new();
        let storage = Arc::new(storage);
        let builder = ConnectionOrchestrator::builder()
            .transport(transport.clone())
            .storage(Arc::clone(&storage))
            .config_store(Arc::new(MemoryConfigStore::new()))
            .prompter(prompter.clone())
            .resources(resources.clone());
        let orchestrator = configure(builder, &transport).build().unwrap();

        let connected = Arc::new(AtomicUsize::new(0));
        let disconnected = Arc::new(AtomicUsize::new(0));
        orchestrator.subscribe("test", EventKind::Connected, "count", counter(&connected), false);
        orchestrator.subscribe(
            "test",
            EventKind::Disconnected,
            "count",
            counter(&disconnected),
            false,
        );

        Self {
            transport,
            prompter,
            resources,
            storage,
            orchestrator,
            connected,
            disconnected,
        }
    }

    fn connected(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnected(&self) -> usize {
        self.disconnected.load(Ordering::SeqCst)
    }
}

fn counter(count: &Arc<AtomicUsize>) -> EventHandler {
    let count = Arc::clone(count);
    handler(move || {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

fn credentials(name: &str) -> Credentials {
    Credentials::new(name, "ibmi.example.com", "QPGMR").with_password("secret")
}

fn run<F: Future>(future: F) -> F::Output {
    tokio::runtime::Runtime::new().unwrap().block_on(future)
}

/// Polls `condition` until it holds, failing the test after five seconds
async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ========== Properties ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Every successful connect fires one connected event after the previous
    /// handle was disposed, and is remembered as the last connection
    #[test]
    fn prop_successful_connects_replace_previous(
        names in prop::collection::vec(arb_connection_name(), 1..5),
        host in arb_hostname(),
    ) {
        let fixture = Fixture::new();
        let stale_open = Arc::new(Mutex::new(Vec::new()));
        {
            let transport = Arc::clone(&fixture.transport);
            let stale_open = Arc::clone(&stale_open);
            fixture.orchestrator.subscribe(
                "test",
                EventKind::Connected,
                "check-previous",
                handler(move || {
                    let opened = transport.opened();
                    let still_open = opened
                        .iter()
                        .take(opened.len().saturating_sub(1))
                        .filter(|channel| channel.is_open())
                        .count();
                    stale_open.lock().unwrap().push(still_open);
                    async { Ok(()) }
                }),
                false,
            );
        }

        let results = run(async {
            let mut results = Vec::new();
            for name in &names {
                let creds = Credentials::new(name, &host, "QPGMR");
                results.push(fixture.orchestrator.connect(ConnectOptions::new(creds)).await);
            }
            results
        });

        prop_assert!(results.iter().all(|r| r.success()));
        prop_assert_eq!(fixture.connected(), names.len());
        prop_assert_eq!(fixture.disconnected(), 0);
        prop_assert!(stale_open.lock().unwrap().iter().all(|open| *open == 0));
        prop_assert_eq!(fixture.orchestrator.state(), LifecycleState::Connected);

        let last = names.last().unwrap().clone();
        let current = fixture.orchestrator.connection().unwrap();
        prop_assert_eq!(current.name(), last.clone());
        prop_assert!(current.is_live());
        prop_assert_eq!(fixture.storage.connection_name(), Some(last.clone()));
        prop_assert_eq!(fixture.storage.get_last_connection(), Some(last));
    }

    /// A failed connect without retry leaves nothing behind
    #[test]
    fn prop_failed_connect_leaves_idle(name in arb_connection_name(), error in arb_open_error()) {
        let fixture = Fixture::new();
        let expected = ErrorCode::from(&error);
        fixture.transport.push_failure(error);

        let result = run(fixture.orchestrator.connect(ConnectOptions::new(credentials(&name))));

        prop_assert!(!result.success());
        prop_assert_eq!(result.code(), Some(&expected));
        prop_assert!(result.detail().is_some());
        prop_assert!(fixture.orchestrator.connection().is_none());
        prop_assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
        prop_assert_eq!(fixture.connected(), 0);
        prop_assert_eq!(fixture.prompter.retry_prompts(), 0);
        prop_assert_eq!(fixture.storage.get_last_connection(), None);
    }

    /// With retry enabled, each failure asks once; the attempt ends at the
    /// first success or the first declined retry
    #[test]
    fn prop_retry_loop(failures in 1_usize..4, accepted in 0_usize..5) {
        let fixture = Fixture::new();
        for _ in 0..failures {
            fixture
                .transport
                .push_failure(TransportError::Unreachable("no route".to_string()));
        }
        for _ in 0..accepted {
            fixture.prompter.answer_retry(true);
        }

        let result = run(fixture.orchestrator.connect(
            ConnectOptions::new(credentials("dev")).reconnect_on_failure(true),
        ));

        if accepted >= failures {
            prop_assert!(result.success());
            prop_assert_eq!(fixture.transport.open_calls(), failures + 1);
            prop_assert_eq!(fixture.prompter.retry_prompts(), failures);
            prop_assert_eq!(fixture.connected(), 1);
        } else {
            prop_assert!(!result.success());
            prop_assert_eq!(fixture.transport.open_calls(), accepted + 1);
            prop_assert_eq!(fixture.prompter.retry_prompts(), accepted + 1);
            prop_assert_eq!(fixture.connected(), 0);
            prop_assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
        }
    }

    /// Unsaved resources block disconnect and leave the connection intact
    #[test]
    fn prop_unsaved_resources_block_disconnect(
        unsaved in prop::collection::vec("[A-Z]{1,8}/[A-Z]{1,8}\\.[a-z]{3}", 1..4),
    ) {
        let fixture = Fixture::new();
        fixture.resources.set_unsaved(unsaved.clone());

        let outcome = run(async {
            fixture.orchestrator.connect(ConnectOptions::new(credentials("dev"))).await;
            fixture.orchestrator.disconnect().await
        });

        match outcome {
            Err(LifecycleError::UnsavedResources(listed)) => {
                prop_assert_eq!(listed, unsaved);
            }
            other => {
                prop_assert!(false, "unexpected outcome: {:?}", other);
            }
        }
        prop_assert_eq!(fixture.prompter.notices().len(), 1);
        prop_assert_eq!(fixture.disconnected(), 0);
        prop_assert_eq!(fixture.orchestrator.state(), LifecycleState::Connected);
        prop_assert!(fixture.orchestrator.connection().is_some());
    }
}

// ========== Scenarios ==========

#[test]
fn test_disconnect_clears_current_connection() {
    let fixture = Fixture::new();
    let channel = fixture.transport.push_channel();

    let result = run(async {
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("dev")))
            .await;
        fixture.orchestrator.disconnect().await
    });

    assert!(result.is_ok());
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
    assert!(fixture.orchestrator.connection().is_none());
    assert_eq!(fixture.disconnected(), 1);
    assert_eq!(fixture.storage.connection_name(), None);
    assert_eq!(fixture.storage.get_last_connection(), Some("dev".to_string()));
    assert!(!channel.is_open());
    assert_eq!(channel.close_calls(), 1);
}

#[test]
fn test_invalid_credentials_never_open() {
    let fixture = Fixture::new();

    let result = run(fixture.orchestrator.connect(ConnectOptions::new(Credentials::new(
        "dev", "", "QPGMR",
    ))));

    assert!(!result.success());
    assert_eq!(result.code(), Some(&ErrorCode::InvalidCredentials));
    assert_eq!(fixture.transport.open_calls(), 0);
    assert_eq!(fixture.connected(), 0);
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
    assert!(fixture.orchestrator.connection().is_none());
}

#[test]
fn test_failed_connect_keeps_previous_connection() {
    let fixture = Fixture::new();

    let result = run(async {
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("dev")))
            .await;
        fixture
            .transport
            .push_failure(TransportError::AuthFailed("bad password".to_string()));
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("prod")))
            .await
    });

    assert_eq!(result.code(), Some(&ErrorCode::AuthFailed));
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Connected);
    assert_eq!(fixture.orchestrator.connection().unwrap().name(), "dev");
    assert_eq!(fixture.connected(), 1);
}

#[test]
fn test_drop_then_reconnect() {
    let fixture = Fixture::new();
    let first = fixture.transport.push_channel();
    fixture.prompter.answer_reconnect(true);

    run(async {
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("dev")))
            .await;
        first.drop_connection();
        wait_until(|| fixture.connected() == 2).await;
    });

    assert_eq!(fixture.prompter.reconnect_prompts(), 1);
    assert_eq!(fixture.transport.open_calls(), 2);
    assert_eq!(fixture.disconnected(), 0);
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Connected);
    let current = fixture.orchestrator.connection().unwrap();
    assert!(current.is_reconnect());
    assert!(current.is_live());
}

#[test]
fn test_drop_declined_tears_down() {
    let fixture = Fixture::new();
    let channel = fixture.transport.push_channel();
    fixture.prompter.answer_reconnect(false);
    fixture.resources.set_unsaved(vec!["QGPL/QRPGLESRC/HELLO.rpgle".to_string()]);

    run(async {
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("dev")))
            .await;
        channel.drop_connection();
        wait_until(|| fixture.disconnected() == 1).await;
    });

    assert_eq!(fixture.prompter.reconnect_prompts(), 1);
    assert_eq!(fixture.transport.open_calls(), 1);
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
    assert!(fixture.orchestrator.connection().is_none());
    assert_eq!(fixture.storage.connection_name(), None);
}

#[test]
fn test_cancel_in_flight_attempt() {
    let fixture = Fixture::new();
    fixture.transport.push_hang();
    let cancel = CancelHandle::new();

    let result = run(async {
        let orchestrator = Arc::clone(&fixture.orchestrator);
        let options = ConnectOptions::new(credentials("dev")).with_cancel(cancel.clone());
        let attempt = tokio::spawn(async move { orchestrator.connect(options).await });

        wait_until(|| fixture.transport.open_calls() == 1).await;
        assert_eq!(fixture.orchestrator.state(), LifecycleState::Connecting);
        cancel.cancel();
        attempt.await.unwrap()
    });

    assert!(result.is_cancelled());
    assert_eq!(result.code(), Some(&ErrorCode::Cancelled));
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
    assert!(fixture.orchestrator.connection().is_none());
    assert_eq!(fixture.connected(), 0);
}

#[test]
fn test_disconnect_cancels_in_flight_attempt() {
    let fixture = Fixture::new();
    fixture.transport.push_hang();

    let (result, disconnect) = run(async {
        let orchestrator = Arc::clone(&fixture.orchestrator);
        let attempt = tokio::spawn(async move {
            orchestrator
                .connect(ConnectOptions::new(credentials("dev")))
                .await
        });

        wait_until(|| fixture.transport.open_calls() == 1).await;
        let disconnect = fixture.orchestrator.disconnect().await;
        (attempt.await.unwrap(), disconnect)
    });

    assert!(result.is_cancelled());
    assert!(disconnect.is_ok());
    assert_eq!(fixture.disconnected(), 0);
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
}

#[test]
fn test_connected_handler_may_disconnect() {
    let fixture = Fixture::new();
    let weak = Arc::downgrade(&fixture.orchestrator);
    fixture.orchestrator.subscribe(
        "test",
        EventKind::Connected,
        "disconnect-again",
        handler(move || {
            let weak = weak.clone();
            async move {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator
                        .disconnect()
                        .await
                        .map_err(|e| HandlerError::new(e.to_string()))?;
                }
                Ok::<(), HandlerError>(())
            }
        }),
        true,
    );

    let result = run(
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("dev"))),
    );

    assert!(result.success());
    assert_eq!(fixture.connected(), 1);
    assert_eq!(fixture.disconnected(), 1);
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
}

#[test]
fn test_drop_during_startup_operations_is_handled() {
    let fixture = Fixture::with(Storage::new(Arc::new(MemoryBackend::new())), |builder, transport| {
        let channel = transport.push_channel();
        builder.connected_operation(Arc::new(move |_handle: Arc<ConnectionHandle>| {
            let channel = Arc::clone(&channel);
            async move {
                channel.drop_connection();
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), HandlerError>(())
            }
            .boxed()
        }))
    });
    fixture.prompter.answer_reconnect(false);

    run(async {
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("dev")))
            .await;
        wait_until(|| fixture.disconnected() == 1).await;
    });

    assert_eq!(fixture.prompter.reconnect_prompts(), 1);
    assert_eq!(fixture.connected(), 0);
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
    assert!(fixture.orchestrator.connection().is_none());
    assert_eq!(fixture.storage.connection_name(), None);
}

#[test]
fn test_failed_connect_while_drop_pending_is_not_idle() {
    let fixture = Fixture::new();
    let channel = fixture.transport.push_channel();
    fixture
        .transport
        .push_failure(TransportError::Unreachable("host down".to_string()));
    fixture.prompter.hold_reconnect();

    run(async {
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("dev")))
            .await;
        channel.drop_connection();
        wait_until(|| fixture.prompter.reconnect_prompts() == 1).await;

        let result = fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("prod")))
            .await;
        assert!(!result.success());
        assert_eq!(fixture.orchestrator.state(), LifecycleState::Disconnecting);
        let lost = fixture.orchestrator.connection().unwrap();
        assert!(!lost.is_live());

        fixture.prompter.release_reconnect();
        wait_until(|| fixture.disconnected() == 1).await;
    });

    assert_eq!(fixture.connected(), 1);
    assert_eq!(fixture.orchestrator.state(), LifecycleState::Idle);
    assert!(fixture.orchestrator.connection().is_none());
}

#[test]
fn test_connect_without_load_keeps_stored_history() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("storage.json");

    run(async {
        let earlier = Storage::new(Arc::new(JsonFileBackend::new(path.clone())));
        earlier.load().await.unwrap();
        earlier.set_last_connection("old").unwrap();
        earlier.save().await.unwrap();
    });

    let fixture = Fixture::with(
        Storage::new(Arc::new(JsonFileBackend::new(path.clone()))),
        |builder, _| builder,
    );
    let result = run(
        fixture
            .orchestrator
            .connect(ConnectOptions::new(credentials("new"))),
    );
    assert!(result.success());

    let reopened = Storage::new(Arc::new(JsonFileBackend::new(path)));
    run(reopened.load()).unwrap();
    let names: Vec<String> = reopened
        .get_last_connections()
        .into_iter()
        .map(|last| last.name)
        .collect();
    assert_eq!(names, vec!["new".to_string(), "old".to_string()]);
}
