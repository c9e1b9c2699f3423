//! Input parameter validation tests.
//!
//! Invalid tool arguments produce MCP `invalid_params` errors; out-of-range
//! counts and unknown aspect ratios are normalised instead of rejected.

#[cfg(test)]
mod tests {
    use crate::server_startup::test_server;
    use serde_json::{Map, Value, json};

    fn args(value: Value) -> Option<Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_missing_arguments_rejected() {
        let home = tempfile::tempdir().unwrap();
        let err = test_server(home.path()).call("whisk_generate", None).await.unwrap_err();
        assert!(err.message.contains("Missing parameters"));
    }

    #[tokio::test]
    async fn test_missing_prompt_rejected() {
        let home = tempfile::tempdir().unwrap();
        let err = test_server(home.path())
            .call("whisk_generate", args(json!({ "count": 2 })))
            .await
            .unwrap_err();
        assert!(err.message.contains("Invalid parameters"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_wrong_type_rejected() {
        let home = tempfile::tempdir().unwrap();
        let err = test_server(home.path())
            .call("whisk_generate", args(json!({ "prompt": "cat", "count": "many" })))
            .await
            .unwrap_err();
        assert!(err.message.contains("Invalid parameters"));
    }

    #[tokio::test]
    async fn test_missing_reference_rejected() {
        let home = tempfile::tempdir().unwrap();
        let err = test_server(home.path())
            .call("whisk_generate_with_ref", args(json!({ "prompt": "cat" })))
            .await
            .unwrap_err();
        assert!(err.message.contains("referenceImage"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let home = tempfile::tempdir().unwrap();
        let err = test_server(home.path())
            .call("whisk_generate_with_ref", args(json!({ "prompt": "", "referenceImage": "a.png" })))
            .await
            .unwrap_err();
        assert!(err.message.contains("Prompt cannot be empty"));
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let home = tempfile::tempdir().unwrap();
        let err = test_server(home.path()).call("imagen_generate", None).await.unwrap_err();
        assert!(err.message.contains("Unknown tool: imagen_generate"));
    }
}

#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;
    use whisk_proxy_image::handler::{MAX_IMAGE_COUNT, MIN_IMAGE_COUNT, VALID_ASPECT_RATIOS, clamp_count};
    use whisk_proxy_image::{AspectRatio, BatchRequest};

    /// Strategy to generate valid prompts
    fn valid_prompt_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ]{1,100}".prop_filter("Must not be empty", |s| !s.trim().is_empty())
    }

    /// Strategy to generate blank prompts
    fn blank_prompt_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("".to_string()),
            Just("   ".to_string()),
            Just("\t\n".to_string()),
        ]
    }

    fn valid_aspect_ratio_strategy() -> impl Strategy<Value = String> {
        prop::sample::select(VALID_ASPECT_RATIOS.to_vec()).prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn valid_prompts_pass_validation(prompt in valid_prompt_strategy()) {
            let request = BatchRequest::new(prompt, AspectRatio::Square, 1, "out");
            prop_assert!(request.validate().is_ok());
        }

        #[test]
        fn blank_prompts_fail_validation(prompt in blank_prompt_strategy()) {
            let request = BatchRequest::new(prompt, AspectRatio::Square, 1, "out");
            prop_assert!(request.validate().is_err());
        }

        #[test]
        fn counts_are_clamped(count in any::<i64>()) {
            let clamped = clamp_count(count);
            prop_assert!((MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT).contains(&clamped));
            if (1..=10).contains(&count) {
                prop_assert_eq!(clamped as i64, count);
            }
        }

        #[test]
        fn known_ratios_round_trip(ratio in valid_aspect_ratio_strategy()) {
            let parsed = AspectRatio::from_user(&ratio);
            prop_assert!(parsed.api_value().starts_with("IMAGE_ASPECT_RATIO_"));
        }

        #[test]
        fn unknown_ratios_fall_back_to_square(ratio in "[0-9]{1,2}:[0-9]{1,2}|[a-z]{0,8}") {
            prop_assume!(!VALID_ASPECT_RATIOS.contains(&ratio.as_str()));
            prop_assert_eq!(AspectRatio::from_user(&ratio), AspectRatio::Square);
        }
    }
}
