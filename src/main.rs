//! omnidispatch - language-aware request dispatch for OmniSharp-style servers
//!
//! Serves the stdio protocol and offers a few one-shot commands for
//! inspecting configuration and routing.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use omnidispatch::app::App;
use omnidispatch::cli::output::{error_value, print_json};
use omnidispatch::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // stdout carries protocol packets, so logs always go to stderr.
    // Quiet by default; RUST_LOG or --log-level for more.
    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| "omnidispatch=warn".into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "omnidispatch=warn".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!(
                r#"{{"success":false,"error":"Failed to create runtime: {}"}}"#,
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(cli)) {
        print_json(&error_value(format!("{:#}", e)));
        std::process::exit(2);
    }
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let mut app = App::new(cli.root, cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize: {}", e))?;

    use omnidispatch::cli::commands;

    match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, &mut app).await,
        Commands::Endpoints(args) => commands::endpoints::execute(args, &app).await,
        Commands::Config(args) => commands::config::execute(args, &app).await,
    }
}
