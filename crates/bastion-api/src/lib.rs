//! # bastion-api
//!
//! HTTP API for BASTION.
//!
//! Serves coverage reports, the dashboard summary, Caldera operation helpers,
//! index discovery and the results page embedded in the Caldera plugin.

pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod web;

pub use error::ApiError;
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
