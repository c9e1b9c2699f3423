//! Server startup integration tests.
//!
//! Tests that the MCP server can be instantiated and reports its tools,
//! resources and capabilities.

use std::sync::Arc;

use whisk_proxy_common::{Config, TokenStore};
use whisk_proxy_image::{WhiskHandler, WhiskServer};

/// Server rooted in a throwaway home directory.
pub fn test_server(home: &std::path::Path) -> WhiskServer {
    let mut config = Config::with_home(home);
    config.open_browser = false;
    let store = Arc::new(TokenStore::from_config(&config));
    WhiskServer::new(WhiskHandler::new(config), store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::ServerHandler;
    use whisk_proxy_image::server::{resource_list, tools};

    #[test]
    fn test_whisk_server_startup() {
        let home = tempfile::tempdir().unwrap();
        let info = test_server(home.path()).get_info();

        let instructions = info.instructions.as_ref().unwrap().to_lowercase();
        assert!(instructions.contains("image"), "Server instructions should mention 'image'");
        assert!(instructions.contains("whisk_login"));
    }

    #[test]
    fn test_capabilities_include_tools_and_resources() {
        let home = tempfile::tempdir().unwrap();
        let info = test_server(home.path()).get_info();

        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
    }

    #[test]
    fn test_all_tools_registered() {
        let names: Vec<String> = tools().iter().map(|t| t.name.to_string()).collect();
        for expected in ["whisk_generate", "whisk_generate_with_ref", "whisk_status", "whisk_login"] {
            assert!(names.iter().any(|n| n == expected), "missing tool {}", expected);
        }
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn test_resources_registered() {
        let resources = resource_list();
        assert_eq!(resources.len(), 2);
        for resource in &resources {
            assert!(resource.raw.uri.starts_with("whisk://"));
            assert_eq!(resource.raw.mime_type.as_deref(), Some("application/json"));
        }
    }
}
