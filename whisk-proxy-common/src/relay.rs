//! Local token relay.
//!
//! A small HTTP listener on `127.0.0.1:<auth_port>` that the Whisk Proxy
//! browser extension posts the session's access token to. Accepted tokens are
//! validated and written to the shared token file, where the CLI and the MCP
//! server pick them up.
//!
//! Routes:
//! - `POST /auth` – receive `{"token": ...}` or `{"accessToken": ...}`
//! - `GET /status` – connection state of the stored token
//! - `GET /` – a status page for humans
//!
//! # Example
//!
//! ```ignore
//! let relay = AuthRelay::new(config.auth_port, store.clone());
//! if let RelayState::Started(handle) = relay.start().await? {
//!     // ... wait for a token ...
//!     handle.stop().await?;
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::auth::{TokenStore, now_ms};
use crate::error::AuthError;
use crate::server::{ServerError, shutdown_channel};

const STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Whisk Proxy</title>
  <style>
    body { font-family: system-ui; max-width: 600px; margin: 50px auto; padding: 20px; }
    h1 { color: #333; }
    .status { padding: 10px; border-radius: 5px; margin: 20px 0; }
    .connected { background: #d4edda; color: #155724; }
    .disconnected { background: #f8d7da; color: #721c24; }
  </style>
</head>
<body>
  <h1>Whisk Proxy</h1>
  <div id="status" class="status disconnected">Checking...</div>
  <script>
    fetch('/status')
      .then(r => r.json())
      .then(data => {
        const el = document.getElementById('status');
        el.textContent = data.message;
        el.className = 'status ' + (data.connected ? 'connected' : 'disconnected');
      })
      .catch(() => {
        document.getElementById('status').textContent = 'Error checking status';
      });
  </script>
</body>
</html>
"#;

/// Pull the token out of a body posted by the browser extension.
///
/// `token` wins over `accessToken`. Empty and non-string values count as absent.
fn submitted_token(body: &serde_json::Value) -> Option<String> {
    ["token", "accessToken"]
        .into_iter()
        .filter_map(|key| body.get(key)?.as_str())
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Token relay server configuration.
pub struct AuthRelay {
    port: u16,
    store: Arc<TokenStore>,
}

/// Outcome of starting the relay.
#[derive(Debug)]
pub enum RelayState {
    /// This process now serves the relay.
    Started(RelayHandle),
    /// The port is taken, most likely by another Whisk Proxy process sharing
    /// the same token file.
    AlreadyRunning,
}

impl RelayState {
    /// Stop the relay if this process started it.
    pub async fn stop(self) -> Result<(), ServerError> {
        match self {
            RelayState::Started(handle) => handle.stop().await,
            RelayState::AlreadyRunning => Ok(()),
        }
    }
}

/// Handle to a running relay.
#[derive(Debug)]
pub struct RelayHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl RelayHandle {
    /// Address the relay is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL of the relay, e.g. `http://127.0.0.1:3847`.
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Shut the relay down gracefully and wait for it to finish.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let result = match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Transport(e.to_string())),
        };
        info!("Token relay stopped");
        result
    }
}

impl AuthRelay {
    /// Create a relay on `port` writing into `store`. Port 0 picks a free port.
    pub fn new(port: u16, store: Arc<TokenStore>) -> Self {
        Self { port, store }
    }

    /// Bind the listener and serve in a background task.
    ///
    /// # Errors
    /// Returns `ServerError::BindFailed` for bind errors other than the port
    /// already being in use.
    pub async fn start(self) -> Result<RelayState, ServerError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                info!(port = self.port, "Port already in use, token relay may already be running");
                return Ok(RelayState::AlreadyRunning);
            }
            Err(e) => {
                return Err(ServerError::BindFailed {
                    port: self.port,
                    message: e.to_string(),
                });
            }
        };

        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let app = router(self.store);

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .map_err(|e| ServerError::Transport(e.to_string()))
        });

        info!(addr = %local_addr, "Token relay listening");
        Ok(RelayState::Started(RelayHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        }))
    }
}

/// Build the relay router.
pub fn router(store: Arc<TokenStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(status_page))
        .route("/auth", post(receive_token))
        .route("/status", get(token_status))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(cors)
        .with_state(store)
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": error.into() }))).into_response()
}

async fn receive_token(State(store): State<Arc<TokenStore>>, body: Bytes) -> Response {
    let body: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            debug!("Rejecting relay body: {}", e);
            return failure(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let Some(token) = submitted_token(&body) else {
        return failure(StatusCode::BAD_REQUEST, "No token provided");
    };

    match store.save_token(&token).await {
        Ok(stored) => {
            let expires_in = stored.remaining_ms(now_ms()).max(0);
            let minutes = expires_in / 60_000;
            info!("Token received and saved. Valid for {} minutes.", minutes);
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": format!("Connected! Token valid for {} minutes.", minutes),
                    "expiresIn": expires_in,
                })),
            )
                .into_response()
        }
        Err(AuthError::InvalidToken) => failure(StatusCode::BAD_REQUEST, "Token is invalid or expired"),
        Err(e) => {
            warn!("Failed to store relayed token: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn token_status(State(store): State<Arc<TokenStore>>) -> Json<serde_json::Value> {
    let stored = match store.read_token_file().await {
        Ok(Some(stored)) => stored,
        Ok(None) => return Json(json!({ "connected": false, "message": "Not connected" })),
        Err(e) => {
            debug!("Relay status could not read token: {}", e);
            return Json(json!({ "connected": false, "message": "Error reading token" }));
        }
    };

    let validation = store.validate(&stored.access_token).await;
    if !validation.valid {
        return Json(json!({ "connected": false, "message": "Token expired" }));
    }

    Json(json!({
        "connected": true,
        "message": format!("Connected. Token valid for {} minutes.", validation.minutes_left()),
        "expiresIn": validation.expires_in_ms,
    }))
}

async fn status_page() -> Html<&'static str> {
    Html(STATUS_PAGE)
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
