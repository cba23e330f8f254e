//! Property-based tests for the configuration façade

use ibmiconn_core::config::is_valid_library_name;
use ibmiconn_core::{
    ConfigError, ConfigStore, ConnectionConfig, MemoryConfigStore, StoredConnection,
    TomlConfigStore,
};
use proptest::prelude::*;
use tempfile::TempDir;

// ========== Generators ==========

/// Strategy for generating connection names
fn arb_connection_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}".prop_map(String::from)
}

/// Strategy for generating valid IBM i library names
fn arb_library() -> impl Strategy<Value = String> {
    "[A-Z#$@][A-Z0-9#$@_]{0,9}".prop_map(String::from)
}

/// Strategy for generating valid configuration records
fn arb_config() -> impl Strategy<Value = ConnectionConfig> {
    (
        arb_connection_name(),
        arb_library(),
        prop::collection::vec(arb_library(), 0..5),
        "/home/[a-z]{1,8}",
        any::<bool>(),
    )
        .prop_map(|(name, current_library, library_list, home, auto_clear)| {
            let mut config = ConnectionConfig::new(name);
            config.current_library = current_library;
            config.library_list = library_list;
            config.home_directory = home;
            config.auto_clear_temp_data = auto_clear;
            config
        })
}

/// Strategy for generating stored connection definitions
fn arb_stored_connection() -> impl Strategy<Value = StoredConnection> {
    (
        arb_connection_name(),
        "[a-z]{3,10}\\.[a-z]{2,4}",
        "[A-Z][A-Z0-9]{0,9}",
        1_u16..65535,
    )
        .prop_map(|(name, host, user, port)| {
            let mut connection = StoredConnection::new(name, host, user);
            connection.port = port;
            connection
        })
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Runtime::new().unwrap().block_on(future)
}

// ========== Properties ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Valid records survive a save and a fresh load unchanged
    #[test]
    fn prop_toml_store_persists_records(
        config in arb_config(),
        connection in arb_stored_connection(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();

        let (loaded, connections) = run(async {
            let store = TomlConfigStore::with_config_dir(dir.clone());
            store.update(config.clone()).await.unwrap();
            store.upsert_connection(connection.clone()).await.unwrap();
            store.save().await.unwrap();

            let reopened = TomlConfigStore::with_config_dir(dir);
            reopened.load().await.unwrap();
            (reopened.get(&config.name), reopened.connections())
        });

        prop_assert_eq!(loaded, config);
        prop_assert_eq!(connections.len(), 1);
        prop_assert_eq!(&connections[0].name, &connection.name);
        prop_assert_eq!(connections[0].port, connection.port);
    }

    /// Unknown connections get a default record
    #[test]
    fn prop_missing_record_defaults(name in arb_connection_name()) {
        let store = MemoryConfigStore::new();
        prop_assert_eq!(store.get(&name), ConnectionConfig::new(name.as_str()));
    }

    /// Lookups by name ignore case
    #[test]
    fn prop_find_connection_ignores_case(connection in arb_stored_connection()) {
        let store = MemoryConfigStore::with_connections(vec![connection.clone()]);
        let found = store.find_connection(&connection.name.to_uppercase());
        prop_assert_eq!(found, Some(connection));
    }

    /// Library names accepted by the validator are accepted in any case
    #[test]
    fn prop_library_names_case_insensitive(lib in arb_library()) {
        prop_assert!(is_valid_library_name(&lib));
        prop_assert!(is_valid_library_name(&lib.to_lowercase()));
    }
}

// ========== Scenarios ==========

#[test]
fn test_invalid_record_is_rejected() {
    let store = MemoryConfigStore::new();
    let mut config = ConnectionConfig::new("dev");
    config.current_library = "NOT A LIBRARY".to_string();

    let result = run(store.update(config));

    assert!(matches!(result, Err(ConfigError::Validation { .. })));
    assert_eq!(store.get("dev"), ConnectionConfig::new("dev"));
}

#[test]
fn test_remove_connection_drops_its_record() {
    let store = MemoryConfigStore::with_connections(vec![StoredConnection::new(
        "dev".to_string(),
        "ibmi.example.com".to_string(),
        "QPGMR".to_string(),
    )]);
    let mut config = ConnectionConfig::new("dev");
    config.current_library = "MYLIB".to_string();

    run(async {
        store.update(config).await.unwrap();
        assert!(store.remove_connection("DEV").await.unwrap());
        assert!(!store.remove_connection("dev").await.unwrap());
    });

    assert!(store.connections().is_empty());
    assert_eq!(store.get("dev"), ConnectionConfig::new("dev"));
}

#[test]
fn test_profiles_apply_by_name() {
    let mut config = ConnectionConfig::new("dev");
    config.connection_profiles.push(ibmiconn_core::ConnectionProfile {
        name: "nightly".to_string(),
        current_library: "NIGHTLY".to_string(),
        library_list: vec!["NIGHTLY".to_string(), "QGPL".to_string()],
        home_directory: "/home/nightly".to_string(),
    });

    assert!(config.apply_profile("nightly"));
    assert_eq!(config.current_library, "NIGHTLY");
    assert_eq!(config.home_directory, "/home/nightly");
    assert!(!config.apply_profile("missing"));
}
