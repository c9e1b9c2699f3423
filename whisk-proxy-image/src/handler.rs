//! Whisk API client for the MCP server and the CLI.
//!
//! This module provides the `WhiskHandler` struct, the request/response types of
//! the Whisk endpoints, and batch generation that saves images to disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use reqwest::header::ORIGIN;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use whisk_proxy_common::auth::now_ms;
use whisk_proxy_common::config::Config;
use whisk_proxy_common::error::Error;
use whisk_proxy_common::files::{generate_filename, save_image};

/// Text-only generation model.
pub const MODEL_TEXT: &str = "IMAGEN_3_5";

/// Model used with exactly one reference image.
pub const MODEL_SINGLE_REFERENCE: &str = "GEM_PIX";

/// Model used with several reference images.
pub const MODEL_MULTI_REFERENCE: &str = "R2I";

/// Media category for generated board images.
pub const MEDIA_CATEGORY_BOARD: &str = "MEDIA_CATEGORY_BOARD";

/// Media category for subject reference images.
pub const MEDIA_CATEGORY_SUBJECT: &str = "MEDIA_CATEGORY_SUBJECT";

/// Origin header the Whisk endpoints expect.
pub const WHISK_ORIGIN: &str = "https://labs.google";

/// Seeds are drawn from `[0, MAX_SEED)`.
pub const MAX_SEED: u32 = 2_147_483_647;

/// Minimum number of images per batch.
pub const MIN_IMAGE_COUNT: u8 = 1;

/// Maximum number of images per batch.
pub const MAX_IMAGE_COUNT: u8 = 10;

/// Pause between consecutive generation requests.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

/// User-facing aspect ratios.
pub const VALID_ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4"];

/// Aspect ratios understood by the Whisk API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "IMAGE_ASPECT_RATIO_SQUARE")]
    Square,
    #[serde(rename = "IMAGE_ASPECT_RATIO_LANDSCAPE")]
    Landscape,
    #[serde(rename = "IMAGE_ASPECT_RATIO_PORTRAIT")]
    Portrait,
}

impl AspectRatio {
    /// Map a user-supplied ratio to the API enum.
    ///
    /// Accepts the friendly ratios and the API names themselves. Anything else
    /// falls back to square.
    ///
    /// ```
    /// use whisk_proxy_image::handler::AspectRatio;
    ///
    /// assert_eq!(AspectRatio::from_user("16:9"), AspectRatio::Landscape);
    /// assert_eq!(AspectRatio::from_user("3:4"), AspectRatio::Portrait);
    /// assert_eq!(AspectRatio::from_user("IMAGE_ASPECT_RATIO_PORTRAIT"), AspectRatio::Portrait);
    /// assert_eq!(AspectRatio::from_user("2:1"), AspectRatio::Square);
    /// ```
    pub fn from_user(ratio: &str) -> Self {
        match ratio {
            "1:1" | "IMAGE_ASPECT_RATIO_SQUARE" => AspectRatio::Square,
            "16:9" | "4:3" | "IMAGE_ASPECT_RATIO_LANDSCAPE" => AspectRatio::Landscape,
            "9:16" | "3:4" | "IMAGE_ASPECT_RATIO_PORTRAIT" => AspectRatio::Portrait,
            _ => AspectRatio::Square,
        }
    }

    /// The enum value sent on the wire.
    pub fn api_value(&self) -> &'static str {
        match self {
            AspectRatio::Square => "IMAGE_ASPECT_RATIO_SQUARE",
            AspectRatio::Landscape => "IMAGE_ASPECT_RATIO_LANDSCAPE",
            AspectRatio::Portrait => "IMAGE_ASPECT_RATIO_PORTRAIT",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_value())
    }
}

/// Clamp a requested image count into `MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT`.
pub fn clamp_count(requested: i64) -> u8 {
    requested.clamp(MIN_IMAGE_COUNT as i64, MAX_IMAGE_COUNT as i64) as u8
}

fn session_id() -> String {
    format!(";{}", now_ms())
}

fn random_seed() -> u32 {
    rand::thread_rng().gen_range(0..MAX_SEED)
}

/// A reference image that has been uploaded and captioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Media category the image was uploaded under
    pub category: String,
    /// Server-side id returned by the upload
    pub media_id: String,
    /// Caption produced by Whisk, empty when captioning failed
    pub caption: String,
}

/// One batch of generations saved into a directory.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Text prompt (the user instruction when a reference is present)
    pub prompt: String,
    /// Output aspect ratio
    pub aspect_ratio: AspectRatio,
    /// Number of requests to issue, already clamped
    pub count: u8,
    /// Directory the images are written to
    pub output_dir: PathBuf,
    /// Optional reference image for recipe generation
    pub reference: Option<ReferenceImage>,
}

impl BatchRequest {
    /// Create a text-only batch. `count` is clamped to 1..=10.
    pub fn new(prompt: impl Into<String>, aspect_ratio: AspectRatio, count: i64, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio,
            count: clamp_count(count),
            output_dir: output_dir.into(),
            reference: None,
        }
    }

    /// Generate from `reference` instead of text alone.
    pub fn with_reference(mut self, reference: ReferenceImage) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Reject requests that cannot be sent.
    pub fn validate(&self) -> Result<(), Error> {
        if self.prompt.trim().is_empty() {
            return Err(Error::validation("Prompt cannot be empty"));
        }
        Ok(())
    }
}

/// Progress of a running batch.
#[derive(Debug)]
pub enum BatchEvent<'a> {
    /// Request `index` (zero based) of `count` is about to be sent
    Started { index: usize, count: u8 },
    /// An image was written to `path`
    Saved { index: usize, path: &'a Path },
    /// Request `index` failed
    Failed { index: usize, error: &'a Error },
}

/// What a batch produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Paths of the saved images, in order
    pub saved: Vec<PathBuf>,
    /// Errors of the requests that produced no image
    pub errors: Vec<Error>,
}

impl BatchOutcome {
    /// Errors joined with ", ".
    pub fn error_summary(&self) -> String {
        self.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
    }
}

/// Whisk API client.
#[derive(Debug, Clone)]
pub struct WhiskHandler {
    /// Application configuration (endpoint base URLs).
    pub config: Config,
    /// HTTP client for API requests.
    pub http: reqwest::Client,
    request_delay: Duration,
}

impl WhiskHandler {
    /// Create a handler for the configured endpoints.
    pub fn new(config: Config) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a handler with a shared HTTP client.
    pub fn with_client(config: Config, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    /// Override the pause between batch requests.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    async fn post_json<B, R>(&self, endpoint: &str, token: &str, body: &B) -> Result<R, Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(endpoint = %endpoint, "Calling Whisk API");

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(token)
            .header(ORIGIN, WHISK_ORIGIN)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::api(endpoint, 0, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(endpoint, status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::api(endpoint, status.as_u16(), format!("Failed to parse response: {}", e)))
    }

    /// Generate images from text alone. Returns base64 encoded images.
    #[instrument(level = "info", name = "generate_image", skip(self, token, prompt), fields(aspect_ratio = %aspect_ratio))]
    pub async fn generate_image(&self, token: &str, prompt: &str, aspect_ratio: AspectRatio) -> Result<Vec<String>, Error> {
        let request = GenerateImageRequest {
            client_context: ClientContext::backbone(session_id()),
            image_model_settings: ImageModelSettings {
                image_model: MODEL_TEXT,
                aspect_ratio,
            },
            prompt,
            media_category: MEDIA_CATEGORY_BOARD,
            seed: random_seed(),
        };

        let endpoint = self.config.generate_endpoint();
        let response: GenerateImageResponse = self.post_json(&endpoint, token, &request).await?;
        let images = response.into_images();
        if images.is_empty() {
            return Err(Error::api(&endpoint, 200, "No image data in response"));
        }

        info!(count = images.len(), "Received images from Whisk");
        Ok(images)
    }

    /// Upload a base64 image and return its media generation id.
    #[instrument(level = "info", name = "upload_reference", skip(self, token, image_base64))]
    pub async fn upload_reference(&self, token: &str, image_base64: &str, category: &str) -> Result<String, Error> {
        let request = TrpcRequest {
            json: UploadImageInput {
                client_context: ClientContext::labs(session_id()),
                upload_media_input: MediaInput {
                    media_category: category,
                    raw_bytes: image_base64,
                },
            },
        };

        let endpoint = self.config.upload_endpoint();
        let response: TrpcResponse<UploadImageResult> = self.post_json(&endpoint, token, &request).await?;

        response
            .into_result()
            .and_then(|r| r.upload_media_generation_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::api(&endpoint, 200, "No Media ID returned"))
    }

    /// Ask Whisk to describe a base64 image. Empty when it offers no caption.
    #[instrument(level = "info", name = "caption_image", skip(self, token, image_base64))]
    pub async fn caption_image(&self, token: &str, image_base64: &str, category: &str) -> Result<String, Error> {
        let request = TrpcRequest {
            json: CaptionImageInput {
                client_context: ClientContext::labs(session_id()),
                caption_input: CaptionInput {
                    candidates_count: 1,
                    media_input: MediaInput {
                        media_category: category,
                        raw_bytes: image_base64,
                    },
                },
            },
        };

        let endpoint = self.config.caption_endpoint();
        let response: TrpcResponse<CaptionImageResult> = self.post_json(&endpoint, token, &request).await?;

        Ok(response
            .into_result()
            .and_then(|r| r.candidates.into_iter().next())
            .and_then(|c| c.output)
            .unwrap_or_default())
    }

    /// Caption then upload a reference image.
    ///
    /// A captioning failure leaves the caption empty; an upload failure is
    /// returned.
    pub async fn upload_and_analyze_reference(
        &self,
        token: &str,
        image_base64: &str,
        category: &str,
    ) -> Result<ReferenceImage, Error> {
        let caption = match self.caption_image(token, image_base64, category).await {
            Ok(caption) => caption,
            Err(e) => {
                warn!("Captioning failed, continuing without caption: {}", e);
                String::new()
            }
        };

        let media_id = self.upload_reference(token, image_base64, category).await?;
        debug!(media_id = %media_id, caption_len = caption.len(), "Reference uploaded");

        Ok(ReferenceImage {
            category: category.to_string(),
            media_id,
            caption,
        })
    }

    /// Generate images guided by uploaded references.
    #[instrument(level = "info", name = "generate_with_reference", skip(self, token, prompt, references), fields(aspect_ratio = %aspect_ratio, references = references.len()))]
    pub async fn generate_with_reference(
        &self,
        token: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
        references: &[ReferenceImage],
    ) -> Result<Vec<String>, Error> {
        if references.is_empty() {
            return Err(Error::validation("At least one reference image is required"));
        }

        let request = RecipeRequest {
            client_context: ClientContext::backbone(session_id()),
            image_model_settings: ImageModelSettings {
                image_model: if references.len() == 1 {
                    MODEL_SINGLE_REFERENCE
                } else {
                    MODEL_MULTI_REFERENCE
                },
                aspect_ratio,
            },
            user_instruction: prompt,
            recipe_media_inputs: references
                .iter()
                .map(|r| RecipeMediaInput {
                    caption: &r.caption,
                    media_input: RecipeMediaRef {
                        media_category: &r.category,
                        media_generation_id: &r.media_id,
                    },
                })
                .collect(),
            seed: random_seed(),
        };

        let endpoint = self.config.recipe_endpoint();
        let response: GenerateImageResponse = self.post_json(&endpoint, token, &request).await?;
        let images = response.into_images();
        if images.is_empty() {
            return Err(Error::api(&endpoint, 200, "No image data in response"));
        }

        info!(count = images.len(), "Received reference images from Whisk");
        Ok(images)
    }

    async fn generate_and_save(&self, token: &str, request: &BatchRequest, saved_so_far: usize) -> Result<PathBuf, Error> {
        let images = match &request.reference {
            Some(reference) => {
                self.generate_with_reference(token, &request.prompt, request.aspect_ratio, std::slice::from_ref(reference))
                    .await?
            }
            None => self.generate_image(token, &request.prompt, request.aspect_ratio).await?,
        };

        let first = images
            .into_iter()
            .next()
            .ok_or_else(|| Error::validation("No image data in response"))?;
        let filename = generate_filename(&request.prompt, saved_so_far, chrono::Utc::now());
        save_image(&first, &request.output_dir, &filename).await
    }

    /// Run a batch without progress reporting or re-authentication.
    pub async fn generate_batch(&self, token: &str, request: &BatchRequest) -> BatchOutcome {
        self.generate_batch_with_retry(token, request, |_| {}, || std::future::ready(None))
            .await
    }

    /// Run a batch, reporting progress through `on_event`.
    ///
    /// Requests are sequential with the configured pause between them. The
    /// first image of each successful response is saved. When a request fails
    /// with an authentication error, `reauth` is awaited once for that image;
    /// if it yields a token the same image is retried with it.
    pub async fn generate_batch_with_retry<E, F, Fut>(
        &self,
        token: &str,
        request: &BatchRequest,
        mut on_event: E,
        mut reauth: F,
    ) -> BatchOutcome
    where
        E: FnMut(BatchEvent<'_>),
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let count = request.count;
        let mut token = token.to_string();
        let mut outcome = BatchOutcome::default();
        let mut index = 0usize;
        let mut reauthenticated = false;

        while index < count as usize {
            on_event(BatchEvent::Started { index, count });

            match self.generate_and_save(&token, request, outcome.saved.len()).await {
                Ok(path) => {
                    on_event(BatchEvent::Saved { index, path: &path });
                    outcome.saved.push(path);
                }
                Err(e) => {
                    on_event(BatchEvent::Failed { index, error: &e });
                    if e.is_auth_failure() && !reauthenticated {
                        if let Some(fresh) = reauth().await {
                            info!(index, "Retrying with a fresh token");
                            token = fresh;
                            reauthenticated = true;
                            continue;
                        }
                    }
                    outcome.errors.push(e);
                }
            }

            reauthenticated = false;
            index += 1;
            if index < count as usize {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        info!(saved = outcome.saved.len(), failed = outcome.errors.len(), "Batch finished");
        outcome
    }
}

// =============================================================================
// API Request/Response Types
// =============================================================================

/// Client context sent with every request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<&'static str>,
    pub session_id: String,
}

impl ClientContext {
    /// Context for the generation endpoints.
    pub fn backbone(session_id: String) -> Self {
        Self {
            workflow_id: String::new(),
            tool: Some("BACKBONE"),
            session_id,
        }
    }

    /// Context for the labs upload/caption endpoints.
    pub fn labs(session_id: String) -> Self {
        Self {
            workflow_id: String::new(),
            tool: None,
            session_id,
        }
    }
}

/// Model and aspect ratio selection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageModelSettings {
    pub image_model: &'static str,
    pub aspect_ratio: AspectRatio,
}

/// `whisk:generateImage` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest<'a> {
    pub client_context: ClientContext,
    pub image_model_settings: ImageModelSettings,
    pub prompt: &'a str,
    pub media_category: &'static str,
    pub seed: u32,
}

/// `whisk:runImageRecipe` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeRequest<'a> {
    pub client_context: ClientContext,
    pub image_model_settings: ImageModelSettings,
    pub user_instruction: &'a str,
    pub recipe_media_inputs: Vec<RecipeMediaInput<'a>>,
    pub seed: u32,
}

/// A reference passed to recipe generation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeMediaInput<'a> {
    pub caption: &'a str,
    pub media_input: RecipeMediaRef<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeMediaRef<'a> {
    pub media_category: &'a str,
    pub media_generation_id: &'a str,
}

/// tRPC request envelope.
#[derive(Debug, Serialize)]
pub struct TrpcRequest<T> {
    pub json: T,
}

/// Raw image bytes with their category.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInput<'a> {
    pub media_category: &'a str,
    pub raw_bytes: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageInput<'a> {
    pub client_context: ClientContext,
    pub upload_media_input: MediaInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionImageInput<'a> {
    pub client_context: ClientContext,
    pub caption_input: CaptionInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionInput<'a> {
    pub candidates_count: u32,
    pub media_input: MediaInput<'a>,
}

/// Generation response (both text and recipe endpoints).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    #[serde(default)]
    pub image_panels: Vec<ImagePanel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePanel {
    #[serde(default)]
    pub generated_images: Vec<GeneratedImage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    #[serde(default)]
    pub encoded_image: Option<String>,
}

impl GenerateImageResponse {
    /// Encoded images of the first panel.
    pub fn into_images(self) -> Vec<String> {
        self.image_panels
            .into_iter()
            .next()
            .map(|panel| {
                panel
                    .generated_images
                    .into_iter()
                    .filter_map(|img| img.encoded_image)
                    .filter(|data| !data.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// tRPC response envelope: `result.data.json.result`.
#[derive(Debug, Deserialize)]
pub struct TrpcResponse<T> {
    pub result: Option<TrpcData<T>>,
}

#[derive(Debug, Deserialize)]
pub struct TrpcData<T> {
    pub data: Option<TrpcJson<T>>,
}

#[derive(Debug, Deserialize)]
pub struct TrpcJson<T> {
    pub json: Option<TrpcResult<T>>,
}

#[derive(Debug, Deserialize)]
pub struct TrpcResult<T> {
    pub result: Option<T>,
}

impl<T> TrpcResponse<T> {
    /// The innermost result, if every level is present.
    pub fn into_result(self) -> Option<T> {
        self.result?.data?.json?.result
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageResult {
    #[serde(default)]
    pub upload_media_generation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CaptionImageResult {
    #[serde(default)]
    pub candidates: Vec<CaptionCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct CaptionCandidate {
    #[serde(default)]
    pub output: Option<String>,
}
