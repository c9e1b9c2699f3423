//! MCP Server implementation for Whisk image generation.
//!
//! This module provides the MCP server handler that exposes:
//! - `whisk_generate` for text-to-image generation
//! - `whisk_generate_with_ref` for generation guided by a reference image
//! - `whisk_status` and `whisk_login` for the access token
//! - Resources for aspect ratios and models

use crate::handler::{AspectRatio, BatchOutcome, BatchRequest, MEDIA_CATEGORY_SUBJECT, WhiskHandler};
use crate::resources;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::{
        CallToolResult, Content, ListResourcesResult, ReadResourceResult, ResourceContents, ServerCapabilities,
        ServerInfo,
    },
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use whisk_proxy_common::auth::TokenStore;
use whisk_proxy_common::browser::{WHISK_URL, open_whisk_page};
use whisk_proxy_common::error::{AuthError, Error};
use whisk_proxy_common::files::read_image_as_base64;

/// How long `whisk_login` waits for the browser extension.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often `whisk_login` checks the token file.
pub const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(1);


/// MCP Server for Whisk image generation.
#[derive(Clone)]
pub struct WhiskServer {
    handler: Arc<WhiskHandler>,
    store: Arc<TokenStore>,
    login_timeout: Duration,
    login_poll_interval: Duration,
}

/// Tool parameters for whisk_generate.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateToolParams {
    /// The text prompt for image generation
    pub prompt: String,
    /// Number of images to generate (1-10, default 1)
    #[serde(default)]
    pub count: Option<i64>,
    /// Aspect ratio of generated images: 1:1, 16:9, 9:16, 4:3 or 3:4 (default 1:1)
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Directory to save images (default ./whisk-images in the working directory)
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Tool parameters for whisk_generate_with_ref.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateWithRefToolParams {
    /// The text prompt describing what to generate
    pub prompt: String,
    /// Path to the reference image file
    pub reference_image: String,
    /// Number of images to generate (1-10, default 1)
    #[serde(default)]
    pub count: Option<i64>,
    /// Aspect ratio of generated images: 1:1, 16:9, 9:16, 4:3 or 3:4 (default 1:1)
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Directory to save images (default ./whisk-images in the working directory)
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Tools that take no arguments.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoParams {}

impl WhiskServer {
    /// Create a new server around an API client and the shared token store.
    pub fn new(handler: WhiskHandler, store: Arc<TokenStore>) -> Self {
        Self {
            handler: Arc::new(handler),
            store,
            login_timeout: LOGIN_TIMEOUT,
            login_poll_interval: LOGIN_POLL_INTERVAL,
        }
    }

    /// Override how long and how often `whisk_login` polls for a token.
    pub fn with_login_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.login_timeout = timeout;
        self.login_poll_interval = poll_interval;
        self
    }

    fn batch_request(&self, prompt: String, count: Option<i64>, aspect_ratio: Option<&str>, output_dir: Option<String>) -> BatchRequest {
        let output_dir = output_dir
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.handler.config.output_dir.clone());

        BatchRequest::new(
            prompt,
            AspectRatio::from_user(aspect_ratio.unwrap_or("1:1")),
            count.unwrap_or(1),
            output_dir,
        )
    }

    /// Generate images from a text prompt.
    pub async fn generate(&self, params: GenerateToolParams) -> Result<CallToolResult, McpError> {
        let request = self.batch_request(params.prompt, params.count, params.aspect_ratio.as_deref(), params.output_dir);
        request
            .validate()
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        info!(prompt = %request.prompt, count = request.count, "Generating images");

        let Some(token) = self.store.get_access_token().await else {
            return Ok(CallToolResult::error(vec![Content::text(AuthError::NotAuthenticated.to_string())]));
        };

        let outcome = self.handler.generate_batch(&token, &request).await;
        Ok(batch_result(&outcome, ""))
    }

    /// Generate images guided by a reference image file.
    pub async fn generate_with_ref(&self, params: GenerateWithRefToolParams) -> Result<CallToolResult, McpError> {
        let request = self.batch_request(params.prompt, params.count, params.aspect_ratio.as_deref(), params.output_dir);
        request
            .validate()
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        info!(prompt = %request.prompt, reference = %params.reference_image, "Generating images with reference");

        let Some(token) = self.store.get_access_token().await else {
            return Ok(CallToolResult::error(vec![Content::text(AuthError::NotAuthenticated.to_string())]));
        };

        let image = match read_image_as_base64(Path::new(&params.reference_image)).await {
            Ok(image) => image,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to read reference image: {}",
                    e
                ))]));
            }
        };

        let reference = match self
            .handler
            .upload_and_analyze_reference(&token, &image, MEDIA_CATEGORY_SUBJECT)
            .await
        {
            Ok(reference) => reference,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Failed to upload reference: {}",
                    e
                ))]));
            }
        };

        let request = request.with_reference(reference);
        let outcome = self.handler.generate_batch(&token, &request).await;
        Ok(batch_result(&outcome, " with reference"))
    }

    /// Report whether a usable token is available.
    pub async fn status(&self) -> CallToolResult {
        let status = self.store.status().await;
        match status.expires_description() {
            Some(expires) if status.connected => CallToolResult::success(vec![Content::text(format!(
                "✓ Connected to Whisk API\nToken expires: {}",
                expires
            ))]),
            _ => CallToolResult::success(vec![Content::text(
                "✗ Not connected. Please run whisk_login to authenticate.",
            )]),
        }
    }

    /// Wait for the browser extension to deliver a token.
    pub async fn login(&self) -> CallToolResult {
        let status = self.store.status().await;
        if status.connected {
            let expires = status.expires_description().unwrap_or_default();
            return CallToolResult::success(vec![Content::text(format!(
                "✓ Already connected. Token expires {}.",
                expires
            ))]);
        }

        let relay_url = format!("http://127.0.0.1:{}", self.handler.config.auth_port);
        info!(
            relay = %relay_url,
            "Waiting for login: sign in at {} and click Connect in the Whisk Proxy extension",
            WHISK_URL
        );
        if self.handler.config.open_browser {
            open_whisk_page().await;
        }

        let token = self
            .store
            .wait_for_token(self.login_timeout, self.login_poll_interval, |elapsed| {
                debug!(elapsed_secs = elapsed.as_secs(), "Still waiting for token");
            })
            .await;

        match token {
            Some(received) => CallToolResult::success(vec![Content::text(format!(
                "✓ Login successful! Token valid for {} minutes.",
                received.validation.minutes_left()
            ))]),
            None => {
                let err = Error::timeout(self.login_timeout.as_secs());
                warn!("Login failed: {}", err);
                CallToolResult::error(vec![Content::text(format!(
                    "✗ Login timeout. {}. Open {} in Chrome, sign in, \
                     and click Connect in the Whisk Proxy extension (relay: {}). Then try again.",
                    err, WHISK_URL, relay_url
                ))])
            }
        }
    }

    /// Dispatch a tool call by name.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult, McpError> {
        match name {
            "whisk_generate" => self.generate(parse_params(arguments)?).await,
            "whisk_generate_with_ref" => self.generate_with_ref(parse_params(arguments)?).await,
            "whisk_status" => Ok(self.status().await),
            "whisk_login" => Ok(self.login().await),
            _ => Err(McpError::invalid_params(format!("Unknown tool: {}", name), None)),
        }
    }
}

/// Tool definitions advertised by the server.
pub fn tools() -> Vec<rmcp::model::Tool> {
    vec![
        create_tool::<GenerateToolParams>(
            "whisk_generate",
            "Generate images using Google Whisk AI (Imagen 3.5). Saves images to the specified directory.",
        ),
        create_tool::<GenerateWithRefToolParams>(
            "whisk_generate_with_ref",
            "Generate images using a reference image. The AI will use the reference as inspiration.",
        ),
        create_tool::<NoParams>(
            "whisk_status",
            "Check the connection status and token validity for Whisk API",
        ),
        create_tool::<NoParams>(
            "whisk_login",
            "Open a browser window to log in to Google, then wait for the Whisk Proxy extension to send the access token. \
             Use this if not authenticated.",
        ),
    ]
}

/// Resource descriptors advertised by the server.
pub fn resource_list() -> Vec<rmcp::model::Resource> {
    let resource = |uri: &str, name: &str, description: &str| rmcp::model::Resource {
        raw: rmcp::model::RawResource {
            uri: uri.to_string(),
            name: name.to_string(),
            title: None,
            description: Some(description.to_string()),
            mime_type: Some("application/json".to_string()),
            size: None,
            icons: None,
            meta: None,
        },
        annotations: None,
    };

    vec![
        resource(
            resources::ASPECT_RATIOS_URI,
            "Aspect Ratios",
            "Accepted aspect ratios and the Whisk API value each maps to",
        ),
        resource(resources::MODELS_URI, "Whisk Models", "Whisk models and when each is used"),
    ]
}

fn batch_result(outcome: &BatchOutcome, qualifier: &str) -> CallToolResult {
    if outcome.saved.is_empty() {
        return CallToolResult::error(vec![Content::text(format!(
            "Failed to generate images. Errors: {}",
            outcome.error_summary()
        ))]);
    }

    let paths = outcome
        .saved
        .iter()
        .map(|p| format!("- {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut text = format!("Generated {} image(s){}:\n{}", outcome.saved.len(), qualifier, paths);
    if !outcome.errors.is_empty() {
        text.push_str(&format!("\n\nErrors: {}", outcome.error_summary()));
    }

    CallToolResult::success(vec![Content::text(text)])
}

impl ServerHandler for WhiskServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Image generation through Google Whisk using a browser session token. \
                 Use whisk_generate to create images from text prompts, whisk_generate_with_ref \
                 to generate from a reference image, whisk_status to check the token, \
                 and whisk_login to wait for the browser extension to connect."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<rmcp::model::ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(rmcp::model::ListToolsResult {
                tools: tools(),
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        params: rmcp::model::CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move { self.call(params.name.as_ref(), params.arguments).await }
    }

    fn list_resources(
        &self,
        _params: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            debug!("Listing resources");
            Ok(ListResourcesResult {
                resources: resource_list(),
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn read_resource(
        &self,
        params: rmcp::model::ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = &params.uri;
            debug!(uri = %uri, "Reading resource");

            let content = match uri.as_str() {
                resources::ASPECT_RATIOS_URI => resources::aspect_ratios_resource_json(),
                resources::MODELS_URI => resources::models_resource_json(),
                _ => {
                    return Err(McpError::resource_not_found(
                        format!("Unknown resource: {}", uri),
                        None,
                    ));
                }
            };

            Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(content, uri.clone())],
            })
        }
    }
}

/// Create a tool definition from a parameter type.
fn create_tool<T: JsonSchema>(name: &'static str, description: &'static str) -> rmcp::model::Tool {
    use schemars::schema_for;

    let schema = schema_for!(T);
    let input_schema = match serde_json::to_value(&schema).unwrap_or_default() {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };

    rmcp::model::Tool {
        name: Cow::Borrowed(name),
        description: Some(Cow::Borrowed(description)),
        input_schema,
        annotations: None,
        icons: None,
        meta: None,
        output_schema: None,
        title: None,
    }
}

/// Parse tool parameters from JSON arguments.
fn parse_params<T: for<'de> Deserialize<'de>>(
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<T, McpError> {
    arguments
        .map(|args| serde_json::from_value(serde_json::Value::Object(args)))
        .transpose()
        .map_err(|e| McpError::invalid_params(format!("Invalid parameters: {}", e), None))?
        .ok_or_else(|| McpError::invalid_params("Missing parameters", None))
}
