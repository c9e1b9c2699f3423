//! Interactive wait for the browser extension to deliver a token.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use whisk_proxy_common::browser::open_whisk_page;
use whisk_proxy_common::{AuthRelay, RelayState, TokenStore};

/// How long `whisk generate` waits for the extension.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often the token file is checked while waiting.
pub const AUTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Dots printed per progress line.
const DOTS_PER_LINE: u32 = 60;

/// Relay lifetime and token waits for one CLI invocation.
///
/// Cheap to clone; clones share the relay.
#[derive(Clone)]
pub struct AuthSession {
    port: u16,
    store: Arc<TokenStore>,
    relay: Arc<Mutex<Option<RelayState>>>,
    timeout: Duration,
    poll_interval: Duration,
    open_browser: bool,
}

impl AuthSession {
    pub fn new(port: u16, store: Arc<TokenStore>) -> Self {
        Self {
            port,
            store,
            relay: Arc::new(Mutex::new(None)),
            timeout: AUTH_TIMEOUT,
            poll_interval: AUTH_POLL_INTERVAL,
            open_browser: true,
        }
    }

    /// Override the wait timeout and poll interval.
    pub fn with_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Whether to open the Whisk page in the default browser before waiting.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Start the relay unless this session already did.
    ///
    /// A relay owned by another process is fine: it writes the same file.
    pub async fn ensure_relay(&self) -> anyhow::Result<()> {
        let mut relay = self.relay.lock().await;
        if relay.is_none() {
            *relay = Some(AuthRelay::new(self.port, self.store.clone()).start().await?);
        }
        Ok(())
    }

    /// Open the Whisk page, print connect instructions and wait for a token.
    pub async fn wait_for_auth(&self) -> Option<String> {
        if let Err(e) = self.ensure_relay().await {
            eprintln!("✗ Could not start token relay on port {}: {}", self.port, e);
            return None;
        }

        println!();
        if self.open_browser && open_whisk_page().await {
            println!("Opened Whisk in your browser.");
        }
        for line in instructions() {
            println!("{}", line);
        }
        println!();
        print!("Waiting for connection...");
        flush();

        let mut dots = 0u32;
        let received = self
            .store
            .wait_for_token(self.timeout, self.poll_interval, |elapsed| {
                dots += 1;
                print!("{}", progress_tick(dots, elapsed));
                flush();
            })
            .await;

        println!();
        match received {
            Some(received) => {
                println!(
                    "✓ Connected! Token received, valid for {} minutes.",
                    received.validation.minutes_left()
                );
                Some(received.access_token)
            }
            None => {
                eprintln!("✗ Timed out waiting. Try again.");
                None
            }
        }
    }

    /// Stop the relay if this session started it.
    pub async fn stop(&self) {
        if let Some(relay) = self.relay.lock().await.take() {
            if let Err(e) = relay.stop().await {
                tracing::warn!("Failed to stop token relay: {}", e);
            }
        }
    }
}

/// The boxed connect instructions.
pub fn instructions() -> Vec<&'static str> {
    vec![
        "┌─────────────────────────────────────────────────────┐",
        "│  Connect to Whisk                                   │",
        "├─────────────────────────────────────────────────────┤",
        "│  1. Open https://labs.google/fx/tools/whisk         │",
        "│     in Chrome                                       │",
        "│  2. Log in with your Google account                 │",
        "│  3. Click the Whisk Proxy extension icon            │",
        "│  4. Click \"Connect\"                                 │",
        "└─────────────────────────────────────────────────────┘",
    ]
}

/// Hints printed when no token could be obtained.
pub fn troubleshooting() -> Vec<&'static str> {
    vec![
        "  - Make sure the Whisk Proxy extension is installed in Chrome",
        "  - Make sure you are logged in at labs.google/fx/tools/whisk",
        "  - Check that nothing else is using the relay port (WHISK_AUTH_PORT)",
        "  - Or paste a token manually with: whisk login",
    ]
}

/// Output for the `dots`-th poll: a dot, plus the elapsed seconds at the end of each line.
pub fn progress_tick(dots: u32, elapsed: Duration) -> String {
    if dots % DOTS_PER_LINE == 0 {
        format!(". ({}s)\n", elapsed.as_secs())
    } else {
        ".".to_string()
    }
}

fn flush() {
    let _ = std::io::stdout().flush();
}
