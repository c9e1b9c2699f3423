//! Property-based tests for error module.
//!
//! These tests check that error messages carry enough context to act on,
//! and that auth failures are classified consistently.

use proptest::prelude::*;

use crate::error::{AuthError, Error};

/// Generate valid HTTP status codes (100-599)
fn http_status_strategy() -> impl Strategy<Value = u16> {
    100u16..600u16
}

/// Generate Whisk-like endpoint URLs
fn endpoint_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("https://[a-z-]+\\.(googleapis\\.com|google)/v[0-9]+/whisk:[a-zA-Z]+")
        .unwrap()
        .prop_filter("endpoint must be non-empty", |s| !s.is_empty())
}

/// Generate error messages
fn message_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ]{1,100}"
}

proptest! {
    /// Every API error names the endpoint and the HTTP status it failed with.
    #[test]
    fn api_error_includes_endpoint_and_status(
        endpoint in endpoint_strategy(),
        status_code in http_status_strategy(),
        message in message_strategy()
    ) {
        let err = Error::api(&endpoint, status_code, &message);
        let err_string = err.to_string();

        prop_assert!(
            err_string.contains(&endpoint),
            "API error should include endpoint '{}' in message: {}",
            endpoint,
            err_string
        );
        prop_assert!(
            err_string.contains(&status_code.to_string()),
            "API error should include status code '{}' in message: {}",
            status_code,
            err_string
        );
        prop_assert!(err_string.contains(&message));
    }

    /// Only 401 and 403 responses count as auth failures.
    #[test]
    fn api_auth_failure_classification(
        endpoint in endpoint_strategy(),
        status_code in http_status_strategy(),
    ) {
        let err = Error::api(&endpoint, status_code, "failure");
        prop_assert_eq!(err.is_auth_failure(), status_code == 401 || status_code == 403);
    }

    /// Validation errors keep the original message verbatim.
    #[test]
    fn validation_error_preserves_message(message in message_strategy()) {
        let err = Error::validation(&message);
        prop_assert!(err.to_string().contains(&message));
        prop_assert!(!err.is_auth_failure());
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn not_authenticated_points_at_login_tool() {
        assert_eq!(
            AuthError::NotAuthenticated.to_string(),
            "Not authenticated. Please run whisk_login first to log in to Google."
        );
    }

    #[test]
    fn auth_errors_are_auth_failures() {
        for err in [
            AuthError::NotAuthenticated,
            AuthError::InvalidToken,
            AuthError::storage("disk full"),
        ] {
            assert!(Error::from(err).is_auth_failure());
        }
    }

    #[test]
    fn storage_error_includes_reason() {
        let err = AuthError::storage("permission denied");
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn io_and_timeout_are_not_auth_failures() {
        let io = Error::from(std::io::Error::other("boom"));
        assert!(!io.is_auth_failure());
        assert!(!Error::timeout(300).is_auth_failure());
    }
}
