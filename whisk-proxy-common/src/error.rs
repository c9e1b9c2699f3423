//! Error types for the common library.
//!
//! This module provides a unified error hierarchy using `thiserror` for consistent
//! error handling across the MCP server and the command-line client.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing or invalid configuration
//! - `AuthError`: Missing, rejected, or unreadable access tokens
//! - `Error::Api`: Whisk API errors (includes endpoint and status)
//! - `Error::Validation`: Input validation failures
//! - `Error::Io`: File system operations
//! - `Error::Timeout`: Waiting for the browser extension to deliver a token timed out

use thiserror::Error;

/// Unified error type for the common library.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (invalid env values, no home directory)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Authentication errors (no token, rejected token, token file issues)
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// API errors with endpoint and HTTP status context
    ///
    /// A status code of 0 means the request never got a response.
    #[error("API error for {endpoint} (HTTP {status_code}): {message}")]
    Api {
        /// The API endpoint that was called
        endpoint: String,
        /// HTTP status code returned by the API
        status_code: u16,
        /// Error message from the API or describing the failure
        message: String,
    },

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// File system I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Waiting for a token timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

impl Error {
    /// Create a new API error with endpoint, status code, and message.
    ///
    /// # Example
    ///
    /// ```
    /// use whisk_proxy_common::error::Error;
    ///
    /// let err = Error::api(
    ///     "https://aisandbox-pa.googleapis.com/v1/whisk:generateImage",
    ///     500,
    ///     "Internal server error"
    /// );
    /// assert!(err.to_string().contains("whisk:generateImage"));
    /// assert!(err.to_string().contains("500"));
    /// ```
    pub fn api(endpoint: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Error::Api {
            endpoint: endpoint.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create a new validation error.
    ///
    /// # Example
    ///
    /// ```
    /// use whisk_proxy_common::error::Error;
    ///
    /// let err = Error::validation("prompt cannot be empty");
    /// assert!(err.to_string().contains("prompt cannot be empty"));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Create a new timeout error.
    ///
    /// ```
    /// use whisk_proxy_common::error::Error;
    ///
    /// assert_eq!(Error::timeout(300).to_string(), "Operation timed out after 300 seconds");
    /// ```
    pub fn timeout(seconds: u64) -> Self {
        Error::Timeout(seconds)
    }

    /// Whether the failure means the access token is missing, expired, or rejected.
    ///
    /// ```
    /// use whisk_proxy_common::error::{AuthError, Error};
    ///
    /// assert!(Error::api("https://example.com", 401, "UNAUTHENTICATED").is_auth_failure());
    /// assert!(Error::from(AuthError::NotAuthenticated).is_auth_failure());
    /// assert!(!Error::api("https://example.com", 500, "boom").is_auth_failure());
    /// ```
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Error::Auth(_) => true,
            Error::Api { status_code, .. } => matches!(status_code, 401 | 403),
            _ => false,
        }
    }
}

/// Configuration errors.
///
/// These errors occur when loading or validating configuration from
/// environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// No place to keep the token file
    #[error("Could not determine the home directory. Set WHISK_PROXY_HOME to choose where the token is stored")]
    MissingHomeDir,
}

impl ConfigError {
    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Authentication errors.
///
/// These errors occur while obtaining, validating, or persisting the
/// access token captured from the browser session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable token is available
    #[error("Not authenticated. Please run whisk_login first to log in to Google.")]
    NotAuthenticated,

    /// The token was rejected by Google or expires within a minute
    #[error("Token is invalid or expired")]
    InvalidToken,

    /// The token file could not be read or written
    #[error("Token storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Create a new token storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        AuthError::Storage(message.into())
    }
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
