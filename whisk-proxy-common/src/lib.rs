//! Whisk Proxy Common Library
//!
//! Shared utilities for configuration, access-token storage, the local token
//! relay, image persistence, error handling, and tracing used by the Whisk
//! MCP server and the `whisk` command-line client.

pub mod auth;
pub mod browser;
pub mod config;
pub mod error;
pub mod files;
pub mod relay;
pub mod server;
pub mod tracing;
pub mod transport;

#[cfg(test)]
mod error_test;

pub use auth::{AuthStatus, ReceivedToken, StoredToken, TokenStore, TokenValidation, TokenValidator};
pub use config::Config;
pub use error::{AuthError, ConfigError, Error, Result};
pub use relay::{AuthRelay, RelayHandle, RelayState};
pub use server::{McpServerBuilder, ServerError, shutdown_channel, wait_for_shutdown_signal};
pub use transport::{Transport, TransportArgs, TransportMode};
