//! Persistence gateway for flowdeck.
//!
//! The editor never talks to the executor directly. Everything it stores,
//! runs, or debugs goes through a [`PersistenceGateway`]:
//!
//! - [`HttpGateway`] speaks the service's REST API with `reqwest`
//! - [`InMemoryGateway`] keeps definitions in memory for tests and offline use

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod types;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::PersistenceGateway;
pub use http::HttpGateway;
pub use memory::{GatewayCall, InMemoryGateway};
pub use types::{
    DebugRequest, DebugResponse, ExecuteRequest, ExecuteResponse, RunError, RunStatus, SortBy,
    SortOrder,
};
