//! Whisk Proxy Image Library
//!
//! Image generation through Google Whisk: the API client, the MCP server
//! exposing it as tools, and the resources describing models and ratios.

pub mod handler;
pub mod resources;
pub mod server;

pub use handler::{AspectRatio, BatchEvent, BatchOutcome, BatchRequest, ReferenceImage, WhiskHandler};
pub use server::WhiskServer;
