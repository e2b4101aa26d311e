//! CLI module for omnidispatch
//!
//! Provides command-line interface using clap derive macros.

pub mod commands;
pub mod output;

pub use output::OutputContext;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{config::ConfigArgs, endpoints::EndpointsArgs, serve::ServeArgs};

const LONG_ABOUT: &str = r#"
omnidispatch - language-aware request dispatch for OmniSharp-style servers

Reads request packets from stdin, one JSON object per line, routes each one to
the handlers registered for the request's language and writes the response
packet to stdout. Handlers run in process or inside plugin processes that
speak the same protocol.

QUICK START:
  1. Write a config:          omnidispatch config init
  2. Inspect routing:         omnidispatch endpoints
  3. Serve on stdio:          omnidispatch serve

Logs go to stderr. Use --log-level or RUST_LOG=omnidispatch=debug.
"#;

/// omnidispatch - language-aware request dispatch and aggregation
#[derive(Parser, Debug)]
#[command(name = "omnidispatch")]
#[command(author, version, about, long_about = LONG_ABOUT)]
#[command(propagate_version = true)]
#[command(after_help = "Use 'omnidispatch <COMMAND> --help' for more information about a command.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file, replacing the project config
    #[arg(long, global = true, env = "OMNIDISPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "omnidispatch=trace"
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve requests over stdin/stdout
    Serve(ServeArgs),

    /// List endpoints and the handlers registered for them
    Endpoints(EndpointsArgs),

    /// Configuration management
    Config(ConfigArgs),
}
