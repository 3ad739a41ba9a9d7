//! Caldera connector for operations and their executed links.

mod client;
mod mock;

pub use client::{CalderaConfig, CalderaConnector};
pub use mock::MockCalderaConnector;
