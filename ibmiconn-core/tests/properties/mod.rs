//! Property-based tests for the IBM i Connect core library

mod config_tests;
mod event_bus_tests;
mod orchestrator_tests;
mod storage_tests;
