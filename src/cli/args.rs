//! CLI argument definitions (SPEC_FULL.md §1).

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "aiwatch",
    about = "Terminal dashboard for concurrently running CLI AI coding-assistant processes",
    after_help = "\
EXAMPLES:
    aiwatch                                  Run with defaults, launch the TUI
    aiwatch --config aiwatch.toml            Run with a config file
    aiwatch --setup                          Enable telemetry in the assistant's settings file
    aiwatch --headless --debug otlp.jsonl    Run the receiver only, dumping raw payloads"
)]
pub struct Args {
    /// Path to a TOML config file. Missing keys take documented defaults.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Merge telemetry-enabling keys into the assistant's settings file, then exit.
    #[arg(long)]
    pub setup: bool,

    /// Settings file to modify with `--setup` (defaults to `~/.claude/settings.json`).
    #[arg(long, value_name = "FILE", requires = "setup")]
    pub settings_path: Option<PathBuf>,

    /// Append every raw ingested OTLP payload to this file as JSON lines.
    #[arg(long, value_name = "FILE")]
    pub debug: Option<PathBuf>,

    /// Override the configured OTLP gRPC listen port.
    #[arg(long)]
    pub grpc_port: Option<u16>,

    /// Override the configured OTLP HTTP listen port.
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Run the receiver/scanner/analytics loop without launching the TUI.
    #[arg(long)]
    pub headless: bool,

    /// Suppress non-essential log output (only warnings and above).
    #[arg(short, long)]
    pub quiet: bool,
}
