//! Tool schema validity tests.
//!
//! Every registered tool must carry a description and an object schema whose
//! properties use the camelCase argument names clients send.

use serde_json::Value;

/// Validates that a JSON schema has the required structure.
fn validate_json_schema(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "Schema must be an object".to_string())?;

    if let Some(type_val) = obj.get("type") {
        if type_val != "object" {
            return Err(format!("Expected type 'object', got {:?}", type_val));
        }
    }

    if let Some(properties) = obj.get("properties") {
        if !properties.is_object() {
            return Err("Properties must be an object".to_string());
        }
    }

    Ok(())
}

/// Validates that a tool has required fields.
fn validate_tool(tool: &rmcp::model::Tool) -> Result<(), String> {
    if tool.name.is_empty() {
        return Err("Tool name cannot be empty".to_string());
    }

    if tool.description.as_ref().is_none_or(|d| d.is_empty()) {
        return Err(format!("Tool '{}' must have a description", tool.name));
    }

    if tool.input_schema.is_empty() {
        return Err(format!("Tool '{}' must have an input schema", tool.name));
    }

    let schema_value = serde_json::to_value(&*tool.input_schema)
        .map_err(|e| format!("Failed to serialize schema: {}", e))?;
    validate_json_schema(&schema_value)?;

    Ok(())
}

/// Names listed under `required` in a tool schema.
fn required_fields(tool: &rmcp::model::Tool) -> Vec<String> {
    tool.input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Property names of a tool schema.
fn property_names(tool: &rmcp::model::Tool) -> Vec<String> {
    tool.input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::sync::Arc;
    use whisk_proxy_image::server::tools;

    fn tool(name: &str) -> rmcp::model::Tool {
        tools()
            .into_iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("tool {} not registered", name))
    }

    #[test]
    fn test_json_schema_validation() {
        let valid_schema = serde_json::json!({
            "type": "object",
            "properties": { "prompt": { "type": "string" } },
            "required": ["prompt"]
        });
        assert!(validate_json_schema(&valid_schema).is_ok());

        let invalid_schema = serde_json::json!({ "type": "string" });
        assert!(validate_json_schema(&invalid_schema).is_err());
    }

    #[test]
    fn test_tool_validation_rejects_missing_description() {
        let invalid_tool = rmcp::model::Tool {
            name: Cow::Borrowed("test_tool"),
            description: None,
            input_schema: Arc::new(serde_json::Map::new()),
            annotations: None,
            icons: None,
            meta: None,
            output_schema: None,
            title: None,
        };
        assert!(validate_tool(&invalid_tool).is_err());
    }

    #[test]
    fn test_all_registered_tools_are_valid() {
        for tool in tools() {
            validate_tool(&tool).unwrap_or_else(|e| panic!("{}", e));
        }
    }

    #[test]
    fn test_generate_schema() {
        let tool = tool("whisk_generate");
        let mut props = property_names(&tool);
        props.sort();
        assert_eq!(props, vec!["aspectRatio", "count", "outputDir", "prompt"]);
        assert_eq!(required_fields(&tool), vec!["prompt"]);
    }

    #[test]
    fn test_generate_with_ref_schema() {
        let tool = tool("whisk_generate_with_ref");
        let mut required = required_fields(&tool);
        required.sort();
        assert_eq!(required, vec!["prompt", "referenceImage"]);
        assert!(property_names(&tool).contains(&"aspectRatio".to_string()));
    }

    #[test]
    fn test_session_tools_take_no_arguments() {
        for name in ["whisk_status", "whisk_login"] {
            let tool = tool(name);
            assert!(property_names(&tool).is_empty(), "{} should take no arguments", name);
            assert!(required_fields(&tool).is_empty());
        }
    }

    #[test]
    fn test_descriptions_mention_purpose() {
        assert!(tool("whisk_generate").description.unwrap().contains("Generate images"));
        assert!(tool("whisk_generate_with_ref").description.unwrap().contains("reference"));
        assert!(tool("whisk_status").description.unwrap().contains("token"));
    }
}
