//! `whisk` command-line client.
//!
//! Generates images through Google Whisk using the token relayed by the
//! browser extension, and manages that token.

pub mod args;
pub mod auth;
pub mod commands;

pub use args::{Cli, Command};
