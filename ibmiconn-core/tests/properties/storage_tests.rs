//! Property-based tests for the storage façade
//!
//! Global keys are visible whatever the current connection is; connection
//! keys only to the connection that wrote them.

use std::sync::Arc;

use ibmiconn_core::storage::MAX_PREVIOUS_CUR_LIBS;
use ibmiconn_core::{JsonFileBackend, MemoryBackend, ServerSettings, SourceList, Storage};
use proptest::prelude::*;
use tempfile::TempDir;

// ========== Generators ==========

/// Strategy for generating connection names
fn arb_connection_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}".prop_map(String::from)
}

/// Strategy for generating IBM i library names
fn arb_library() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9]{0,9}".prop_map(String::from)
}

/// Strategy for generating source lists
fn arb_source_list() -> impl Strategy<Value = SourceList> {
    prop::collection::btree_map(
        arb_library(),
        prop::collection::vec("[A-Z][A-Z0-9]{0,9}", 0..5),
        0..4,
    )
}

fn memory_storage() -> Storage {
    Storage::new(Arc::new(MemoryBackend::new()))
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Runtime::new().unwrap().block_on(future)
}

// ========== Properties ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// The last-connection list is most-recent-first without duplicates
    #[test]
    fn prop_last_connections_are_most_recent_first(
        names in prop::collection::vec(arb_connection_name(), 1..10),
    ) {
        let storage = memory_storage();
        for name in &names {
            storage.set_last_connection(name).unwrap();
        }

        let listed: Vec<String> = storage
            .get_last_connections()
            .into_iter()
            .map(|last| last.name)
            .collect();

        let mut expected: Vec<String> = Vec::new();
        for name in names.iter().rev() {
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }
        prop_assert_eq!(storage.get_last_connection(), names.last().cloned());
        prop_assert_eq!(listed, expected);
    }

    /// Connection-scoped values written under one connection are invisible
    /// under another
    #[test]
    fn prop_connection_state_is_isolated(
        first in arb_connection_name(),
        second in arb_connection_name(),
        list in arb_source_list(),
    ) {
        prop_assume!(first != second);
        let storage = memory_storage();

        storage.set_connection_name(Some(first.clone()));
        storage.set_source_list(list.clone()).unwrap();

        storage.set_connection_name(Some(second));
        prop_assert!(storage.get_source_list().is_empty());

        storage.set_connection_name(Some(first));
        prop_assert_eq!(storage.get_source_list(), list);
    }

    /// The current-library history keeps the newest entries, upper-cased and
    /// without duplicates
    #[test]
    fn prop_previous_cur_libs_bounded(libs in prop::collection::vec(arb_library(), 1..25)) {
        let storage = memory_storage();
        storage.set_connection_name(Some("dev".to_string()));
        for lib in &libs {
            storage.add_previous_cur_lib(&lib.to_lowercase()).unwrap();
        }

        let history = storage.get_previous_cur_libs();
        prop_assert!(history.len() <= MAX_PREVIOUS_CUR_LIBS);
        prop_assert_eq!(history.first(), libs.last());
        let mut seen = std::collections::HashSet::new();
        prop_assert!(history.iter().all(|lib| seen.insert(lib.clone())));
    }
}

// ========== Scenarios ==========

#[test]
fn test_writes_without_connection_are_ignored() {
    let storage = memory_storage();
    storage.set_last_profile("dev-profile").unwrap();
    storage.set_deployment("/home/me/project", Some("/home/QPGMR/build")).unwrap();

    assert_eq!(storage.get_last_profile(), None);
    assert!(storage.get_deployments().is_empty());
}

#[test]
fn test_delete_connection_state() {
    let storage = memory_storage();
    storage.set_connection_name(Some("dev".to_string()));
    storage.set_last_profile("nightly").unwrap();
    storage
        .set_server_settings("dev", &ServerSettings::empty())
        .unwrap();

    storage.delete_connection_state("dev");

    assert_eq!(storage.get_last_profile(), None);
    assert!(storage.get_server_settings("dev").is_none());
}

#[test]
fn test_json_backend_persists_across_instances() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state").join("storage.json");

    run(async {
        let storage = Storage::new(Arc::new(JsonFileBackend::new(path.clone())));
        storage.load().await.unwrap();
        storage.set_last_connection("dev").unwrap();
        storage.set_connection_name(Some("dev".to_string()));
        storage.add_previous_cur_lib("mylib").unwrap();
        storage.save().await.unwrap();

        let reopened = Storage::new(Arc::new(JsonFileBackend::new(path)));
        reopened.load().await.unwrap();
        reopened.set_connection_name(Some("dev".to_string()));
        assert_eq!(reopened.get_last_connection(), Some("dev".to_string()));
        assert_eq!(reopened.get_previous_cur_libs(), vec!["MYLIB".to_string()]);
    });
}
