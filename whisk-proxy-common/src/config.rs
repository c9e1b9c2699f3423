//! Configuration module for loading environment variables and settings.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Default port of the local token relay.
pub const DEFAULT_AUTH_PORT: u16 = 3847;

/// Default directory for generated images, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "./whisk-images";

/// Default host of the Whisk generation endpoints.
pub const DEFAULT_API_BASE_URL: &str = "https://aisandbox-pa.googleapis.com";

/// Default host of the Whisk web app (upload and caption endpoints).
pub const DEFAULT_LABS_BASE_URL: &str = "https://labs.google";

/// Google's OAuth2 token introspection endpoint.
pub const DEFAULT_TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";

/// Name of the directory under `$HOME` used when `WHISK_PROXY_HOME` is unset.
pub const HOME_DIR_NAME: &str = ".whisk-proxy";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `token.json`
    pub home_dir: PathBuf,
    /// Token relay port
    pub auth_port: u16,
    /// Default output directory for generated images
    pub output_dir: PathBuf,
    /// Base URL of the generation API
    pub api_base_url: String,
    /// Base URL of the Whisk web app
    pub labs_base_url: String,
    /// Token introspection URL
    pub tokeninfo_url: String,
    /// Open the Whisk page in the default browser when a login starts
    pub open_browser: bool,
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if `WHISK_AUTH_PORT` is not a port number
    /// or `WHISK_OPEN_BROWSER` is not a boolean,
    /// or `ConfigError::MissingHomeDir` if neither `WHISK_PROXY_HOME` nor a user
    /// home directory is available.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let home_dir = match std::env::var("WHISK_PROXY_HOME") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .map(|home| home.join(HOME_DIR_NAME))
                .ok_or(ConfigError::MissingHomeDir)?,
        };

        let auth_port = match std::env::var("WHISK_AUTH_PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_value("WHISK_AUTH_PORT", format!("'{}' is not a port number", raw)))?,
            Err(_) => DEFAULT_AUTH_PORT,
        };

        let output_dir = std::env::var("WHISK_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let api_base_url =
            std::env::var("WHISK_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let labs_base_url =
            std::env::var("WHISK_LABS_BASE_URL").unwrap_or_else(|_| DEFAULT_LABS_BASE_URL.to_string());
        let tokeninfo_url =
            std::env::var("WHISK_TOKENINFO_URL").unwrap_or_else(|_| DEFAULT_TOKENINFO_URL.to_string());

        let open_browser = match std::env::var("WHISK_OPEN_BROWSER") {
            Ok(raw) => parse_flag(&raw)
                .ok_or_else(|| ConfigError::invalid_value("WHISK_OPEN_BROWSER", format!("'{}' is not a boolean", raw)))?,
            Err(_) => true,
        };

        Ok(Self {
            home_dir,
            auth_port,
            output_dir,
            api_base_url,
            labs_base_url,
            tokeninfo_url,
            open_browser,
        })
    }

    /// Configuration rooted at `home_dir` with every other value at its default.
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            auth_port: DEFAULT_AUTH_PORT,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            labs_base_url: DEFAULT_LABS_BASE_URL.to_string(),
            tokeninfo_url: DEFAULT_TOKENINFO_URL.to_string(),
            open_browser: true,
        }
    }

    /// Path of the persisted access token.
    pub fn token_file(&self) -> PathBuf {
        self.home_dir.join("token.json")
    }

    /// Text-to-image endpoint.
    pub fn generate_endpoint(&self) -> String {
        format!("{}/v1/whisk:generateImage", self.api_base_url.trim_end_matches('/'))
    }

    /// Reference-guided ("recipe") generation endpoint.
    pub fn recipe_endpoint(&self) -> String {
        format!("{}/v1/whisk:runImageRecipe", self.api_base_url.trim_end_matches('/'))
    }

    /// Reference image upload endpoint.
    pub fn upload_endpoint(&self) -> String {
        format!("{}/fx/api/trpc/backbone.uploadImage", self.labs_base_url.trim_end_matches('/'))
    }

    /// Reference image captioning endpoint.
    pub fn caption_endpoint(&self) -> String {
        format!("{}/fx/api/trpc/backbone.captionImage", self.labs_base_url.trim_end_matches('/'))
    }
}

/// Parse a boolean environment value (`1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`).
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
