//! Output format tests.
//!
//! Tool results are plain text content; resources are JSON documents.

use rmcp::model::{CallToolResult, RawContent};

/// Validates that a CallToolResult carries non-empty text content.
fn validate_tool_result(result: &CallToolResult) -> Result<String, String> {
    if result.content.is_empty() {
        return Err("Result should have content".to_string());
    }

    let mut text = String::new();
    for content in &result.content {
        match &content.raw {
            RawContent::Text(t) if !t.text.is_empty() => text.push_str(&t.text),
            RawContent::Text(_) => return Err("Text content should not be empty".to_string()),
            _ => return Err("Only text content is expected".to_string()),
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_startup::test_server;
    use chrono::{TimeZone, Utc};
    use whisk_proxy_common::files::generate_filename;
    use whisk_proxy_image::resources::{aspect_ratios_resource_json, models_resource_json};

    #[tokio::test]
    async fn test_status_without_token() {
        let home = tempfile::tempdir().unwrap();
        let result = test_server(home.path()).call("whisk_status", None).await.unwrap();

        let text = validate_tool_result(&result).unwrap();
        assert!(text.starts_with('✗'));
        assert_ne!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_generate_without_token_is_error_result() {
        let home = tempfile::tempdir().unwrap();
        let mut args = serde_json::Map::new();
        args.insert("prompt".into(), "a cat".into());

        let result = test_server(home.path()).call("whisk_generate", Some(args)).await.unwrap();

        assert_eq!(result.is_error, Some(true));
        let text = validate_tool_result(&result).unwrap();
        assert!(text.contains("whisk_login"));
    }

    #[test]
    fn test_resource_documents_are_json_arrays() {
        for doc in [aspect_ratios_resource_json(), models_resource_json()] {
            let value: serde_json::Value = serde_json::from_str(&doc).unwrap();
            assert!(value.as_array().is_some_and(|a| !a.is_empty()));
        }
    }

    #[test]
    fn test_saved_image_names() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            generate_filename("Cat in space", 0, now),
            "Cat_in_space_1_2025-03-09T14-05-07.png"
        );
        assert_eq!(generate_filename("!!!", 2, now), "image_3_2025-03-09T14-05-07.png");
    }
}
