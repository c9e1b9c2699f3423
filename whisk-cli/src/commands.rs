//! Implementations of the `whisk` subcommands.

use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use whisk_proxy_common::auth::{AuthStatus, now_ms};
use whisk_proxy_common::error::AuthError;
use whisk_proxy_common::{AuthRelay, Config, RelayState, TokenStore, wait_for_shutdown_signal};
use whisk_proxy_image::{AspectRatio, BatchEvent, BatchRequest, WhiskHandler};

use crate::args::{GenerateArgs, LoginArgs};
use crate::auth::{AuthSession, troubleshooting};

/// Prefix of Google OAuth access tokens.
pub const ACCESS_TOKEN_PREFIX: &str = "ya29.";

/// `whisk generate`
pub async fn generate(config: Config, store: Arc<TokenStore>, args: GenerateArgs) -> Result<ExitCode> {
    let session = AuthSession::new(config.auth_port, store).with_browser(config.open_browser);
    let result = generate_with_session(config, &session, &args).await;
    session.stop().await;
    result
}

/// Run a generation with an explicit session.
pub async fn generate_with_session(config: Config, session: &AuthSession, args: &GenerateArgs) -> Result<ExitCode> {
    let output_dir = args.output.clone().unwrap_or_else(|| config.output_dir.clone());
    let request = BatchRequest::new(args.prompt(), AspectRatio::from_user(&args.ratio), args.count, output_dir);
    if let Err(e) = request.validate() {
        eprintln!("✗ {}", e);
        return Ok(ExitCode::FAILURE);
    }

    let token = match session.store().get_access_token().await {
        Some(token) => Some(token),
        None => session.wait_for_auth().await,
    };
    let Some(token) = token else {
        eprintln!();
        eprintln!("✗ Could not authenticate");
        eprintln!();
        eprintln!("Troubleshooting:");
        for hint in troubleshooting() {
            eprintln!("{}", hint);
        }
        return Ok(ExitCode::FAILURE);
    };

    println!();
    println!("Generating: \"{}\"", request.prompt);
    println!("Format: {}, Count: {}", request.aspect_ratio, request.count);
    println!();

    let handler = WhiskHandler::new(config);
    let outcome = handler
        .generate_batch_with_retry(
            &token,
            &request,
            |event| match event {
                BatchEvent::Started { index, count } if count > 1 => {
                    println!("[{}/{}] Generating...", index + 1, count);
                }
                BatchEvent::Started { .. } => {}
                BatchEvent::Saved { path, .. } => println!("  ✓ Saved: {}", path.display()),
                BatchEvent::Failed { error, .. } => eprintln!("  ✗ Error: {}", error),
            },
            || {
                let session = session.clone();
                async move {
                    println!();
                    println!("Token expired. Re-authentication required...");
                    session.wait_for_auth().await
                }
            },
        )
        .await;

    println!();
    println!("Done! Generated {} images", outcome.saved.len());

    if outcome.saved.is_empty() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// `whisk status`
pub async fn status(store: &TokenStore, out: &mut impl Write) -> Result<ExitCode> {
    let status = store.status().await;
    for line in status_lines(&status) {
        writeln!(out, "{}", line)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Lines printed by `whisk status`.
pub fn status_lines(status: &AuthStatus) -> Vec<String> {
    match status.expires_description() {
        Some(expires) if status.connected => vec![
            "✓ Connected to Whisk API".to_string(),
            format!("  Token valid: {}", expires),
        ],
        _ => vec![
            "✗ Not connected".to_string(),
            "  Open labs.google/fx/tools/whisk and click Connect in the extension".to_string(),
        ],
    }
}

/// `whisk login`
///
/// Reads the token from `input` when it was not passed on the command line.
pub async fn login(store: &TokenStore, args: LoginArgs, input: &mut impl BufRead, out: &mut impl Write) -> Result<ExitCode> {
    let token = match args.token {
        Some(token) => token,
        None => {
            write!(out, "Paste access token: ")?;
            out.flush()?;
            read_line(input)?
        }
    };
    let token = token.trim();

    if token.is_empty() {
        writeln!(out, "✗ No token provided")?;
        return Ok(ExitCode::FAILURE);
    }

    if !looks_like_access_token(token) {
        write!(
            out,
            "Token does not start with \"{}\" and may not be a Google access token. Save anyway? [y/N] ",
            ACCESS_TOKEN_PREFIX
        )?;
        out.flush()?;
        let answer = read_line(input)?;
        if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            writeln!(out, "Cancelled")?;
            return Ok(ExitCode::FAILURE);
        }
    }

    match store.save_token(token).await {
        Ok(stored) => {
            writeln!(
                out,
                "✓ Token saved. Valid for {} minutes.",
                stored.remaining_ms(now_ms()) / 60_000
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(AuthError::InvalidToken) => {
            writeln!(out, "✗ Token is invalid or expired")?;
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("Failed to save token"),
    }
}

/// `whisk logout`
pub async fn logout(store: &TokenStore, out: &mut impl Write) -> Result<ExitCode> {
    store.clear().await.context("Failed to remove token")?;
    writeln!(out, "✓ Logged out. Token removed from {}", store.path().display())?;
    Ok(ExitCode::SUCCESS)
}

/// `whisk relay`: serve until Ctrl+C.
pub async fn relay(config: &Config, store: Arc<TokenStore>) -> Result<ExitCode> {
    match AuthRelay::new(config.auth_port, store).start().await? {
        RelayState::Started(handle) => {
            println!("Token relay listening on {}", handle.url());
            println!("Click Connect in the Whisk Proxy extension. Press Ctrl+C to stop.");
            wait_for_shutdown_signal().await;
            handle.stop().await?;
            println!("Relay stopped");
            Ok(ExitCode::SUCCESS)
        }
        RelayState::AlreadyRunning => {
            println!("A token relay is already running on port {}", config.auth_port);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Whether `token` has the shape of a Google OAuth access token.
pub fn looks_like_access_token(token: &str) -> bool {
    token.starts_with(ACCESS_TOKEN_PREFIX) && token.len() > ACCESS_TOKEN_PREFIX.len()
}

fn read_line(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read from stdin")?;
    Ok(line)
}
