//! Command-line arguments for `whisk`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Generate images with Google Whisk from the terminal.
#[derive(Debug, Parser)]
#[command(name = "whisk", version)]
#[command(about = "Generate images with Google Whisk from the terminal")]
#[command(after_help = "Examples:\n  \
    whisk generate \"a cat in space\"\n  \
    whisk gen \"sunset over mountains\" -c 4 -r 16:9\n  \
    whisk g \"portrait of a robot\" -o ./robots")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate images from a text prompt
    #[command(visible_aliases = ["gen", "g"])]
    Generate(GenerateArgs),

    /// Show whether a usable access token is available
    #[command(visible_alias = "s")]
    Status,

    /// Save an access token pasted from the browser
    Login(LoginArgs),

    /// Delete the saved access token
    Logout,

    /// Run the token relay until interrupted
    Relay,
}

/// Arguments for `whisk generate`.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Text prompt; multiple words are joined with spaces
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,

    /// Number of images (1-10)
    #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
    pub count: i64,

    /// Aspect ratio: 1:1, 16:9, 9:16, 4:3 or 3:4
    #[arg(short = 'r', long = "ratio", default_value = "1:1")]
    pub ratio: String,

    /// Output directory (defaults to WHISK_OUTPUT_DIR or ./whisk-images)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl GenerateArgs {
    /// The prompt words joined into one string.
    pub fn prompt(&self) -> String {
        self.prompt.join(" ")
    }
}

/// Arguments for `whisk login`.
#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Access token; read from stdin when omitted
    #[arg(long)]
    pub token: Option<String>,
}
