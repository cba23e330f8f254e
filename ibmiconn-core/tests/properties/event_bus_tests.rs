//! Property-based tests for the event bus
//!
//! Handlers record their label into a shared log so invocation order and
//! count can be compared against the registrations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use ibmiconn_core::{handler, EventBus, EventHandler, EventKind, HandlerError};
use proptest::prelude::*;

type Log = Arc<Mutex<Vec<String>>>;

// ========== Generators ==========

/// Strategy for generating a set of distinct subscription names
fn arb_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-z][a-z0-9-]{0,8}", 1..8)
        .prop_map(|names| names.into_iter().collect())
}

/// Strategy for generating names paired with a "fails" flag
fn arb_names_with_faults() -> impl Strategy<Value = Vec<(String, bool)>> {
    arb_names().prop_flat_map(|names| {
        let len = names.len();
        (Just(names), prop::collection::vec(any::<bool>(), len))
            .prop_map(|(names, faults)| names.into_iter().zip(faults).collect())
    })
}

/// Strategy for generating event kinds
fn arb_kind() -> impl Strategy<Value = EventKind> {
    prop::sample::select(EventKind::ALL.to_vec())
}

// ========== Helpers ==========

fn recorder(log: &Log, label: String) -> EventHandler {
    let log = Arc::clone(log);
    handler(move || {
        let log = Arc::clone(&log);
        let label = label.clone();
        async move {
            log.lock().unwrap().push(label);
            Ok(())
        }
    })
}

fn failing_recorder(log: &Log, label: String, panics: bool) -> EventHandler {
    let log = Arc::clone(log);
    handler(move || {
        let log = Arc::clone(&log);
        let label = label.clone();
        async move {
            log.lock().unwrap().push(label.clone());
            if panics {
                panic!("handler {label} panicked");
            }
            Err(HandlerError::new(format!("handler {label} failed")))
        }
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Runtime::new().unwrap().block_on(future)
}

// ========== Properties ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Handlers run in subscription order, once each
    #[test]
    fn prop_fire_follows_subscription_order(names in arb_names(), kind in arb_kind()) {
        let bus = EventBus::new();
        let log = Log::default();
        for name in &names {
            bus.subscribe("feature", kind, name, recorder(&log, name.clone()), false);
        }

        let report = run(bus.fire(kind));

        prop_assert_eq!(report.invoked, names.len());
        prop_assert!(report.failed.is_empty());
        prop_assert_eq!(entries(&log), names);
    }

    /// Re-subscribing an existing key keeps its position and runs only the
    /// new handler
    #[test]
    fn prop_replace_keeps_position(
        names in arb_names(),
        pick in any::<prop::sample::Index>(),
    ) {
        let bus = EventBus::new();
        let log = Log::default();
        for name in &names {
            bus.subscribe("feature", EventKind::Connected, name, recorder(&log, name.clone()), false);
        }
        let replaced = pick.get(&names).clone();
        bus.subscribe(
            "feature",
            EventKind::Connected,
            &replaced,
            recorder(&log, format!("{replaced}-v2")),
            false,
        );

        run(bus.fire(EventKind::Connected));

        let expected: Vec<String> = names
            .iter()
            .map(|n| if *n == replaced { format!("{n}-v2") } else { n.clone() })
            .collect();
        prop_assert_eq!(bus.subscriber_count(EventKind::Connected), names.len());
        prop_assert_eq!(entries(&log), expected);
    }

    /// A failing or panicking handler never stops the ones after it
    #[test]
    fn prop_faults_do_not_stop_siblings(subs in arb_names_with_faults(), panics in any::<bool>()) {
        let bus = EventBus::new();
        let log = Log::default();
        for (name, fails) in &subs {
            let h = if *fails {
                failing_recorder(&log, name.clone(), panics)
            } else {
                recorder(&log, name.clone())
            };
            bus.subscribe("feature", EventKind::Disconnected, name, h, false);
        }

        let report = run(bus.fire(EventKind::Disconnected));

        let names: Vec<String> = subs.iter().map(|(n, _)| n.clone()).collect();
        let failed: Vec<String> = subs
            .iter()
            .filter(|(_, fails)| *fails)
            .map(|(n, _)| format!("feature/{n}"))
            .collect();
        prop_assert_eq!(entries(&log), names);
        prop_assert_eq!(report.failed, failed);
        prop_assert_eq!(bus.subscriber_count(EventKind::Disconnected), subs.len());
    }

    /// Transient handlers run exactly once, whether they succeed or fail
    #[test]
    fn prop_transient_removed_after_first_fire(subs in arb_names_with_faults()) {
        let bus = EventBus::new();
        let log = Log::default();
        for (name, fails) in &subs {
            let h = if *fails {
                failing_recorder(&log, name.clone(), false)
            } else {
                recorder(&log, name.clone())
            };
            bus.subscribe("feature", EventKind::Connected, name, h, true);
        }

        run(async {
            bus.fire(EventKind::Connected).await;
            bus.fire(EventKind::Connected).await;
        });

        prop_assert_eq!(entries(&log).len(), subs.len());
        prop_assert_eq!(bus.subscriber_count(EventKind::Connected), 0);
    }

    /// Kinds are independent registries
    #[test]
    fn prop_kinds_are_isolated(names in arb_names(), kind in arb_kind()) {
        let bus = EventBus::new();
        let log = Log::default();
        for name in &names {
            bus.subscribe("feature", kind, name, recorder(&log, name.clone()), false);
        }

        let others: HashSet<EventKind> = EventKind::ALL.into_iter().filter(|k| *k != kind).collect();
        let invoked: usize = run(async {
            let mut invoked = 0;
            for other in &others {
                invoked += bus.fire(*other).await.invoked;
            }
            invoked
        });

        prop_assert_eq!(invoked, 0);
        prop_assert!(entries(&log).is_empty());
    }
}

// ========== Scenarios ==========

/// Persistent f1 and transient f2: the second fire only runs f1
#[test]
fn test_persistent_and_transient_handlers() {
    let bus = EventBus::new();
    let log = Log::default();
    bus.subscribe("a", EventKind::Connected, "f1", recorder(&log, "f1".to_string()), false);
    bus.subscribe("b", EventKind::Connected, "f2", recorder(&log, "f2".to_string()), true);

    run(async {
        bus.fire(EventKind::Connected).await;
        bus.fire(EventKind::Connected).await;
    });

    assert_eq!(entries(&log), vec!["f1", "f2", "f1"]);
    assert_eq!(
        bus.subscriber_names(EventKind::Connected),
        vec![("a".to_string(), "f1".to_string())]
    );
}

/// The same name under two owners is two subscriptions
#[test]
fn test_owner_is_part_of_the_key() {
    let bus = EventBus::new();
    let log = Log::default();
    bus.subscribe("a", EventKind::Deploy, "refresh", recorder(&log, "a".to_string()), false);
    bus.subscribe("b", EventKind::Deploy, "refresh", recorder(&log, "b".to_string()), false);

    let report = run(bus.fire(EventKind::Deploy));

    assert_eq!(report.invoked, 2);
    assert_eq!(entries(&log), vec!["a", "b"]);
}

/// Legacy registrations share the registry and can be removed by name
#[test]
fn test_legacy_registrations() {
    let bus = EventBus::new();
    let log = Log::default();
    bus.subscribe("a", EventKind::Connected, "first", recorder(&log, "first".to_string()), false);
    let legacy = bus.on_event(EventKind::Connected, recorder(&log, "legacy".to_string()));

    run(bus.fire(EventKind::Connected));
    assert_eq!(entries(&log), vec!["first", "legacy"]);

    assert!(bus.unsubscribe(ibmiconn_core::events::LEGACY_OWNER, EventKind::Connected, &legacy));
    assert_eq!(bus.subscriber_count(EventKind::Connected), 1);
}
