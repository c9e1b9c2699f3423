//! Opening the Whisk web app so the user can sign in and press Connect.

use tracing::{debug, warn};

/// The page the browser extension reads the session token from.
pub const WHISK_URL: &str = "https://labs.google/fx/tools/whisk";

/// Open [`WHISK_URL`] in the default browser.
///
/// Returns whether a browser was launched. A failure is logged and otherwise
/// ignored; the caller still prints the URL for the user to open by hand.
pub async fn open_whisk_page() -> bool {
    match tokio::task::spawn_blocking(|| webbrowser::open(WHISK_URL)).await {
        Ok(Ok(())) => {
            debug!(url = WHISK_URL, "Opened Whisk in the default browser");
            true
        }
        Ok(Err(e)) => {
            warn!(url = WHISK_URL, "Could not open a browser: {}", e);
            false
        }
        Err(e) => {
            warn!("Browser launcher task failed: {}", e);
            false
        }
    }
}
