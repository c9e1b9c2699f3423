//! Tests for the `whisk` subcommands against temporary token files and a
//! mocked Whisk API.

use std::io::Cursor;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tempfile::TempDir;
use whisk_cli::auth::AuthSession;
use whisk_cli::{Cli, Command, commands};
use whisk_proxy_common::auth::{StoredToken, TokenStore, now_ms};
use whisk_proxy_common::config::Config;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "ya29.cli-token";

struct Env {
    _dir: TempDir,
    mock: MockServer,
    config: Config,
    store: Arc<TokenStore>,
}

impl Env {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mock = MockServer::start().await;

        let mut config = Config::with_home(dir.path().join("home"));
        config.api_base_url = mock.uri();
        config.labs_base_url = mock.uri();
        config.tokeninfo_url = format!("{}/tokeninfo", mock.uri());
        config.output_dir = dir.path().join("images");
        config.auth_port = 0;
        config.open_browser = false;

        let store = Arc::new(TokenStore::from_config(&config));
        Self {
            _dir: dir,
            mock,
            config,
            store,
        }
    }

    async fn accept(&self, token: &str, lifetime_secs: i64) {
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .and(query_param("access_token", token))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "exp": (now_ms() / 1000 + lifetime_secs).to_string(),
            })))
            .mount(&self.mock)
            .await;
    }

    fn write_token(&self) {
        std::fs::create_dir_all(&self.config.home_dir).unwrap();
        let stored = StoredToken {
            access_token: TOKEN.to_string(),
            expires_at: now_ms() + 3_600_000,
        };
        std::fs::write(self.config.token_file(), serde_json::to_string(&stored).unwrap()).unwrap();
    }

    fn session(&self) -> AuthSession {
        AuthSession::new(0, self.store.clone())
            .with_wait(Duration::from_millis(200), Duration::from_millis(50))
            .with_browser(self.config.open_browser)
    }
}

fn generate_args(args: &[&str]) -> whisk_cli::args::GenerateArgs {
    let cli = Cli::try_parse_from(std::iter::once("whisk").chain(args.iter().copied())).unwrap();
    match cli.command {
        Command::Generate(args) => args,
        other => panic!("expected generate, got {:?}", other),
    }
}

fn login_args(token: Option<&str>) -> whisk_cli::args::LoginArgs {
    whisk_cli::args::LoginArgs {
        token: token.map(str::to_string),
    }
}

async fn run_login(env: &Env, token: Option<&str>, stdin: &str) -> (ExitCode, String) {
    let mut input = Cursor::new(stdin.as_bytes().to_vec());
    let mut out = Vec::new();
    let code = commands::login(&env.store, login_args(token), &mut input, &mut out)
        .await
        .unwrap();
    (code, String::from_utf8(out).unwrap())
}

#[tokio::test]
async fn login_with_flag_saves_token() {
    let env = Env::new().await;
    env.accept(TOKEN, 40 * 60 + 30).await;

    let (code, out) = run_login(&env, Some(TOKEN), "").await;

    assert_eq!(code, ExitCode::SUCCESS);
    assert!(out.starts_with("✓ Token saved. Valid for 40 minutes."), "{}", out);
    assert_eq!(env.store.get_access_token().await.as_deref(), Some(TOKEN));
}

#[tokio::test]
async fn login_reads_token_from_stdin() {
    let env = Env::new().await;
    env.accept(TOKEN, 3600).await;

    let (code, out) = run_login(&env, None, &format!("  {}  \n", TOKEN)).await;

    assert_eq!(code, ExitCode::SUCCESS);
    assert!(out.starts_with("Paste access token: ✓ Token saved."), "{}", out);
}

#[tokio::test]
async fn login_asks_before_saving_unusual_token() {
    let env = Env::new().await;

    let (code, out) = run_login(&env, Some("not-a-google-token"), "n\n").await;

    assert_eq!(code, ExitCode::FAILURE);
    assert!(out.contains("Save anyway? [y/N]"));
    assert!(out.ends_with("Cancelled\n"));
    assert!(!env.store.path().exists());
}

#[tokio::test]
async fn login_saves_unusual_token_when_confirmed() {
    let env = Env::new().await;
    env.accept("opaque-token", 3600).await;

    let (code, _) = run_login(&env, Some("opaque-token"), "y\n").await;

    assert_eq!(code, ExitCode::SUCCESS);
    assert!(env.store.path().exists());
}

#[tokio::test]
async fn login_rejects_invalid_token() {
    let env = Env::new().await;
    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&env.mock)
        .await;

    let (code, out) = run_login(&env, Some(TOKEN), "").await;

    assert_eq!(code, ExitCode::FAILURE);
    assert_eq!(out, "✗ Token is invalid or expired\n");
}

#[tokio::test]
async fn login_requires_token() {
    let env = Env::new().await;

    let (code, out) = run_login(&env, None, "\n").await;

    assert_eq!(code, ExitCode::FAILURE);
    assert!(out.ends_with("✗ No token provided\n"));
}

#[tokio::test]
async fn logout_removes_token() {
    let env = Env::new().await;
    env.write_token();

    let mut out = Vec::new();
    let code = commands::logout(&env.store, &mut out).await.unwrap();

    assert_eq!(code, ExitCode::SUCCESS);
    assert!(!env.store.path().exists());
    assert!(env.store.get_access_token().await.is_none());

    // A second logout has nothing to remove and still succeeds.
    let code = commands::logout(&env.store, &mut Vec::new()).await.unwrap();
    assert_eq!(code, ExitCode::SUCCESS);
}

#[tokio::test]
async fn status_reports_connection() {
    let env = Env::new().await;

    let mut out = Vec::new();
    commands::status(&env.store, &mut out).await.unwrap();
    assert!(String::from_utf8(out).unwrap().starts_with("✗ Not connected\n"));

    env.write_token();
    env.accept(TOKEN, 10 * 60 + 30).await;

    let mut out = Vec::new();
    commands::status(&env.store, &mut out).await.unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("✓ Connected to Whisk API\n  Token valid: in "), "{}", out);
}

#[tokio::test]
async fn generate_with_saved_token() {
    let env = Env::new().await;
    env.write_token();
    Mock::given(method("POST"))
        .and(path("/v1/whisk:generateImage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "imagePanels": [{"generatedImages": [{"encodedImage": "iVBORw0KGgo="}]}]
        })))
        .mount(&env.mock)
        .await;

    let session = env.session();
    let code = commands::generate_with_session(env.config.clone(), &session, &generate_args(&["g", "tiny", "fox"]))
        .await
        .unwrap();
    session.stop().await;

    assert_eq!(code, ExitCode::SUCCESS);
    let saved: Vec<_> = std::fs::read_dir(&env.config.output_dir).unwrap().collect();
    assert_eq!(saved.len(), 1);
}

#[tokio::test]
async fn generate_fails_without_authentication() {
    let env = Env::new().await;

    let session = env.session();
    let code = commands::generate_with_session(env.config.clone(), &session, &generate_args(&["generate", "fox"]))
        .await
        .unwrap();
    session.stop().await;

    assert_eq!(code, ExitCode::FAILURE);
    assert!(env.mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn generate_rejects_blank_prompt() {
    let env = Env::new().await;
    env.write_token();

    let session = env.session();
    let code = commands::generate_with_session(env.config.clone(), &session, &generate_args(&["generate", " "]))
        .await
        .unwrap();

    assert_eq!(code, ExitCode::FAILURE);
}

#[test]
fn generate_failure_goes_to_stderr() {
    let dir = TempDir::new().unwrap();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_whisk"))
        .args(["generate", " "])
        .current_dir(dir.path())
        .env("WHISK_PROXY_HOME", dir.path().join("home"))
        .env("WHISK_OPEN_BROWSER", "0")
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty(), "{}", String::from_utf8_lossy(&output.stdout));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("✗ Validation error"), "{}", stderr);
}
