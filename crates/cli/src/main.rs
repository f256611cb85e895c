mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{cmd_embed, cmd_info, cmd_inspect, cmd_verify};
use output::OutputFormat;

/// nestbuild - inspect and produce nested build definitions
#[derive(Parser)]
#[command(name = "nestbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List the records of a definition file
  Inspect {
    /// Path to the definition file
    file: PathBuf,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Check that a definition file is well formed and reproducible
  Verify {
    /// Path to the definition file
    file: PathBuf,
  },

  /// Emit a definition that solves the definition embedded in a source
  Embed {
    /// Source identifier, e.g. image://builder:latest
    #[arg(long)]
    source: String,

    /// Path of the embedded definition inside the source filesystem
    #[arg(long)]
    filename: Option<String>,

    /// Target platform (os/arch[/variant]); defaults to the host
    #[arg(long)]
    platform: Option<String>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Show host platform and execution defaults
  Info {
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Inspect { file, format } => cmd_inspect(&file, format),
    Commands::Verify { file } => cmd_verify(&file),
    Commands::Embed {
      source,
      filename,
      platform,
      output,
    } => cmd_embed(&source, filename.as_deref(), platform.as_deref(), output.as_deref()),
    Commands::Info { format } => cmd_info(format),
  }
}
