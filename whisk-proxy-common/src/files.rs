//! Image file helpers: naming, saving base64 payloads, and reading references.

use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};

/// Number of prompt characters used in generated file names.
pub const FILENAME_PROMPT_CHARS: usize = 30;

/// Stem used when the prompt has no usable characters.
pub const FALLBACK_STEM: &str = "image";

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ('\u{0400}'..='\u{04FF}').contains(&c)
}

/// Turn the start of a prompt into a file-name friendly stem.
///
/// ```
/// use whisk_proxy_common::files::prompt_stem;
///
/// assert_eq!(prompt_stem("a cat, in space!"), "a_cat_in_space");
/// assert_eq!(prompt_stem("кот в космосе"), "кот_в_космосе");
/// assert_eq!(prompt_stem("!!!"), "image");
/// ```
pub fn prompt_stem(prompt: &str) -> String {
    let mut stem = String::new();
    for c in prompt.chars().take(FILENAME_PROMPT_CHARS) {
        if is_name_char(c) {
            stem.push(c);
        } else if !stem.ends_with('_') {
            stem.push('_');
        }
    }

    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

/// File name for the `index`-th (zero based) image generated from `prompt`.
///
/// The name is `<stem>_<index + 1>_<YYYY-MM-DDTHH-MM-SS>.png`.
pub fn generate_filename(prompt: &str, index: usize, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.png",
        prompt_stem(prompt),
        index + 1,
        now.format("%Y-%m-%dT%H-%M-%S")
    )
}

/// Strip a `data:image/<type>;base64,` prefix if present.
pub fn strip_data_url(data: &str) -> &str {
    if let Some(rest) = data.strip_prefix("data:image/") {
        if let Some((kind, payload)) = rest.split_once(";base64,") {
            if !kind.is_empty() && kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return payload;
            }
        }
    }
    data
}

/// Decode a base64 image and write it to `output_dir/filename`.
///
/// Creates `output_dir` if needed and returns the written path.
pub async fn save_image(data: &str, output_dir: &Path, filename: &str) -> Result<PathBuf> {
    let bytes = BASE64
        .decode(strip_data_url(data).trim())
        .map_err(|e| Error::validation(format!("Invalid base64 data: {}", e)))?;

    if !output_dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(output_dir).await?;
    }

    let path = output_dir.join(filename);
    tokio::fs::write(&path, &bytes).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "Saved image");
    Ok(path)
}

/// Read an image file and return it base64 encoded.
///
/// Relative paths resolve against the current working directory.
pub async fn read_image_as_base64(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    if !tokio::fs::try_exists(&absolute).await.unwrap_or(false) {
        return Err(Error::validation(format!("File not found: {}", absolute.display())));
    }

    let bytes = tokio::fs::read(&absolute).await?;
    Ok(BASE64.encode(bytes))
}
