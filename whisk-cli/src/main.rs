//! `whisk` command-line client.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use whisk_cli::{Cli, Command, commands};
use whisk_proxy_common::tracing::init_tracing_with_default;
use whisk_proxy_common::{Config, TokenStore};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress goes to stdout; keep logs quiet unless RUST_LOG asks for them.
    init_tracing_with_default("warn");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::from_env()?;
    let store = Arc::new(TokenStore::from_config(&config));

    match cli.command {
        Command::Generate(args) => commands::generate(config, store, args).await,
        Command::Status => commands::status(&store, &mut std::io::stdout()).await,
        Command::Login(args) => {
            commands::login(&store, args, &mut std::io::stdin().lock(), &mut std::io::stdout()).await
        }
        Command::Logout => commands::logout(&store, &mut std::io::stdout()).await,
        Command::Relay => commands::relay(&config, store).await,
    }
}
