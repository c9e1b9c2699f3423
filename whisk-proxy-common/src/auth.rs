//! Access-token storage and validation.
//!
//! Whisk has no public credentials flow, so the proxy replays the OAuth access
//! token of a signed-in browser session. This module provides:
//! - `TokenValidator`: asks Google's tokeninfo endpoint how long a token has left
//! - `TokenStore`: the `token.json` file plus a single in-memory cached token
//!
//! A token is persisted only after introspection reports more than a minute of
//! validity, and handed out only while more than five minutes remain.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::AuthError;

/// Introspection must report more than this much remaining lifetime.
pub const MIN_VALIDITY_MS: i64 = 60_000;

/// Cached and stored tokens are only used while more than this much lifetime remains.
pub const REFRESH_MARGIN_MS: i64 = 5 * 60_000;

/// Lifetime assumed when introspection does not report one.
pub const DEFAULT_LIFETIME_MS: i64 = 60 * 60_000;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The persisted form of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    /// OAuth bearer token (usually starts with `ya29.`)
    pub access_token: String,
    /// Expiry as epoch milliseconds
    pub expires_at: i64,
}

impl StoredToken {
    /// Milliseconds left until expiry (negative once expired).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.expires_at - now_ms
    }

    /// Whether the token still has more than the refresh margin left.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        self.remaining_ms(now_ms) > REFRESH_MARGIN_MS
    }
}

/// Outcome of a token introspection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenValidation {
    /// Whether the token has more than a minute left
    pub valid: bool,
    /// Remaining lifetime in milliseconds, when Google reported an expiry
    pub expires_in_ms: Option<i64>,
}

impl TokenValidation {
    /// A rejected token with unknown lifetime.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Build a validation from an `exp` claim (epoch seconds).
    pub fn from_expiry(exp_secs: i64, now_ms: i64) -> Self {
        let expires_in_ms = exp_secs.saturating_mul(1000).saturating_sub(now_ms);
        Self {
            valid: expires_in_ms > MIN_VALIDITY_MS,
            expires_in_ms: Some(expires_in_ms),
        }
    }

    /// Whole minutes left, rounded down. Zero when unknown or expired.
    pub fn minutes_left(&self) -> i64 {
        self.expires_in_ms.unwrap_or(0).max(0) / 60_000
    }
}

/// A token picked up by [`TokenStore::wait_for_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedToken {
    pub access_token: String,
    /// Introspection result the token was accepted with
    pub validation: TokenValidation,
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    #[serde(default)]
    exp: Option<serde_json::Value>,
}

/// tokeninfo reports `exp` as a string of epoch seconds; accept numbers too.
fn parse_exp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Client for Google's OAuth2 tokeninfo endpoint.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    http: reqwest::Client,
    tokeninfo_url: String,
}

impl TokenValidator {
    /// Create a validator that queries `tokeninfo_url`.
    pub fn new(tokeninfo_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), tokeninfo_url)
    }

    /// Create a validator sharing an existing HTTP client.
    pub fn with_client(http: reqwest::Client, tokeninfo_url: impl Into<String>) -> Self {
        Self {
            http,
            tokeninfo_url: tokeninfo_url.into(),
        }
    }

    /// Ask Google how long `token` remains valid.
    ///
    /// Never fails: transport errors, non-2xx responses and bodies without a
    /// usable `exp` all yield an invalid result.
    #[instrument(level = "debug", name = "validate_token", skip_all)]
    pub async fn validate(&self, token: &str) -> TokenValidation {
        let response = match self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("access_token", token)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Token introspection request failed: {}", e);
                return TokenValidation::invalid();
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "Token rejected by tokeninfo");
            return TokenValidation::invalid();
        }

        let info: TokenInfoResponse = match response.json().await {
            Ok(info) => info,
            Err(e) => {
                debug!("Unreadable tokeninfo response: {}", e);
                return TokenValidation::invalid();
            }
        };

        match info.exp.as_ref().and_then(parse_exp) {
            Some(exp) => {
                let validation = TokenValidation::from_expiry(exp, now_ms());
                debug!(valid = validation.valid, expires_in_ms = ?validation.expires_in_ms, "Token introspected");
                validation
            }
            None => {
                debug!("tokeninfo response has no exp claim");
                TokenValidation::invalid()
            }
        }
    }
}

/// Connection state reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatus {
    /// Whether a usable token is available
    pub connected: bool,
    /// Whole minutes until the token expires
    pub expires_in_minutes: Option<i64>,
}

impl AuthStatus {
    /// Status for a missing or rejected token.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            expires_in_minutes: None,
        }
    }

    /// Human readable expiry, e.g. "in 42 minutes".
    pub fn expires_description(&self) -> Option<String> {
        self.expires_in_minutes.map(|m| format!("in {} minutes", m))
    }
}

/// File-backed access-token store with a single cached value.
///
/// Several processes may share the same file: the relay writes it, the CLI
/// or MCP server reads it.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    validator: TokenValidator,
    cached: RwLock<Option<StoredToken>>,
}

impl TokenStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>, validator: TokenValidator) -> Self {
        Self {
            path: path.into(),
            validator,
            cached: RwLock::new(None),
        }
    }

    /// Create a store for the configured home directory and tokeninfo URL.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.token_file(), TokenValidator::new(config.tokeninfo_url.clone()))
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Introspect an arbitrary token.
    pub async fn validate(&self, token: &str) -> TokenValidation {
        self.validator.validate(token).await
    }

    /// Return a token with more than five minutes left, if any.
    ///
    /// Checks the in-memory cache, then the token file. Makes no network calls.
    pub async fn get_access_token(&self) -> Option<String> {
        let now = now_ms();

        if let Some(token) = self.cached.read().await.as_ref() {
            if token.is_fresh(now) {
                return Some(token.access_token.clone());
            }
        }

        match self.read_token_file().await {
            Ok(Some(token)) if token.is_fresh(now) => {
                let access_token = token.access_token.clone();
                *self.cached.write().await = Some(token);
                Some(access_token)
            }
            Ok(Some(token)) => {
                debug!(remaining_ms = token.remaining_ms(now), "Stored token expires too soon");
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Ignoring unreadable token file: {}", e);
                None
            }
        }
    }

    /// Read the token file as-is, without any expiry filtering.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub async fn read_token_file(&self) -> Result<Option<StoredToken>, AuthError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::storage(format!("{}: {}", self.path.display(), e)));
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthError::storage(format!("{}: {}", self.path.display(), e)))
    }

    /// Validate `token` remotely and persist it.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidToken` if introspection rejects the token,
    /// or `AuthError::Storage` if the file cannot be written.
    #[instrument(level = "debug", name = "save_token", skip_all)]
    pub async fn save_token(&self, token: &str) -> Result<StoredToken, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let validation = self.validator.validate(token).await;
        if !validation.valid {
            return Err(AuthError::InvalidToken);
        }

        let stored = StoredToken {
            access_token: token.to_string(),
            expires_at: now_ms() + validation.expires_in_ms.unwrap_or(DEFAULT_LIFETIME_MS),
        };
        self.write_token_file(&stored).await?;
        *self.cached.write().await = Some(stored.clone());

        info!(minutes = validation.minutes_left(), path = %self.path.display(), "Access token saved");
        Ok(stored)
    }

    async fn write_token_file(&self, token: &StoredToken) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AuthError::storage(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let json = serde_json::to_string_pretty(token).map_err(|e| AuthError::storage(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| AuthError::storage(format!("{}: {}", self.path.display(), e)))
    }

    /// Report whether a usable token exists and how long it has left.
    pub async fn status(&self) -> AuthStatus {
        let Some(token) = self.get_access_token().await else {
            return AuthStatus::disconnected();
        };

        let validation = self.validator.validate(&token).await;
        if !validation.valid {
            return AuthStatus::disconnected();
        }

        AuthStatus {
            connected: true,
            expires_in_minutes: Some(validation.minutes_left()),
        }
    }

    /// Poll the token file until a token with more than the refresh margin
    /// left appears or `timeout` elapses.
    ///
    /// `on_tick` receives the elapsed time after every unsuccessful poll.
    /// Each distinct token is introspected once; a token that is rejected or
    /// too close to expiry is skipped until the file changes.
    pub async fn wait_for_token<F>(&self, timeout: Duration, interval: Duration, mut on_tick: F) -> Option<ReceivedToken>
    where
        F: FnMut(Duration),
    {
        let started = tokio::time::Instant::now();
        let mut rejected: Option<String> = None;

        while started.elapsed() < timeout {
            if let Ok(Some(stored)) = self.read_token_file().await {
                if rejected.as_deref() != Some(stored.access_token.as_str()) {
                    let validation = self.validator.validate(&stored.access_token).await;
                    let usable = validation.valid
                        && validation.expires_in_ms.unwrap_or(0) > REFRESH_MARGIN_MS
                        && stored.is_fresh(now_ms());
                    if usable {
                        let access_token = stored.access_token.clone();
                        *self.cached.write().await = Some(stored);
                        return Some(ReceivedToken {
                            access_token,
                            validation,
                        });
                    }
                    debug!(
                        valid = validation.valid,
                        expires_in_ms = ?validation.expires_in_ms,
                        "Ignoring token that is rejected or expires too soon"
                    );
                    rejected = Some(stored.access_token);
                }
            }

            tokio::time::sleep(interval).await;
            on_tick(started.elapsed());
        }

        None
    }

    /// Forget the cached token and delete the token file.
    pub async fn clear(&self) -> Result<(), AuthError> {
        *self.cached.write().await = None;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Token file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::storage(format!("{}: {}", self.path.display(), e))),
        }
    }
}
