//! Integration test modules.

pub mod agents_tests;
pub mod common;
pub mod correlate_tests;
pub mod health_tests;
pub mod operations_tests;
pub mod plugin_tests;
