//! MCP Resources for the Whisk server.
//!
//! - `whisk://aspect_ratios` - accepted aspect ratios and the API value each maps to
//! - `whisk://models` - the Whisk models and when each is used

use serde::Serialize;

use crate::handler::{AspectRatio, MODEL_MULTI_REFERENCE, MODEL_SINGLE_REFERENCE, MODEL_TEXT, VALID_ASPECT_RATIOS};

/// URI of the aspect ratio resource.
pub const ASPECT_RATIOS_URI: &str = "whisk://aspect_ratios";

/// URI of the models resource.
pub const MODELS_URI: &str = "whisk://models";

/// One row of the aspect ratio mapping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectRatioInfo {
    /// Ratio as accepted from users
    pub ratio: &'static str,
    /// Value sent to the API
    pub api_value: &'static str,
}

/// A Whisk model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model identifier sent to the API
    pub id: &'static str,
    /// When the model is selected
    pub used_for: &'static str,
}

/// The aspect ratio mapping.
pub fn list_aspect_ratios() -> Vec<AspectRatioInfo> {
    VALID_ASPECT_RATIOS
        .iter()
        .map(|ratio| AspectRatioInfo {
            ratio,
            api_value: AspectRatio::from_user(ratio).api_value(),
        })
        .collect()
}

/// The models the proxy uses.
pub fn list_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            id: MODEL_TEXT,
            used_for: "Text-only generation (whisk_generate)",
        },
        ModelInfo {
            id: MODEL_SINGLE_REFERENCE,
            used_for: "Generation with one reference image (whisk_generate_with_ref)",
        },
        ModelInfo {
            id: MODEL_MULTI_REFERENCE,
            used_for: "Generation with several reference images",
        },
    ]
}

/// Aspect ratio resource as JSON.
pub fn aspect_ratios_resource_json() -> String {
    serde_json::to_string_pretty(&list_aspect_ratios()).unwrap_or_else(|_| "[]".to_string())
}

/// Models resource as JSON.
pub fn models_resource_json() -> String {
    serde_json::to_string_pretty(&list_models()).unwrap_or_else(|_| "[]".to_string())
}
