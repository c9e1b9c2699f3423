//! Workspace-level integration tests for the Whisk proxy.
//!
//! These tests verify:
//! - The MCP server reports its tools, resources and capabilities
//! - Tool schemas are well formed and use the camelCase argument names
//! - Invalid tool input is rejected with MCP errors
//! - Tool results and resources have the expected shape

pub mod server_startup;
pub mod tool_schema;
pub mod input_validation;
pub mod output_format;
