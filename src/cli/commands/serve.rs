//! Serve command: run the stdio host

use anyhow::Result;
use clap::Args;

use crate::app::App;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the per-request timeout in seconds
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Override the maximum number of concurrently executing requests
    #[arg(long)]
    pub max_concurrent: Option<usize>,
}

pub async fn execute(args: ServeArgs, app: &mut App) -> Result<()> {
    if let Some(secs) = args.request_timeout {
        app.config.server.request_timeout_secs = secs;
    }
    if let Some(max) = args.max_concurrent {
        app.config.server.max_concurrent = max;
    }

    let server = app.start().await?;
    let host = server.host();

    let shutdown = host.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            shutdown.cancel();
        }
    });

    let result = host.run(tokio::io::stdin(), tokio::io::stdout()).await;
    server.shutdown().await;
    result?;
    Ok(())
}
