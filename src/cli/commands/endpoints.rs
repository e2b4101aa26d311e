//! Endpoints command: report what the dispatch core would serve

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::dispatch::Registration;
use crate::models::endpoint::EndpointDescriptor;

#[derive(Args, Debug)]
pub struct EndpointsArgs {
    /// Only show endpoints with at least one in-process handler or plugin
    #[arg(long)]
    pub handled: bool,
}

#[derive(Serialize)]
struct EndpointEntry {
    #[serde(flatten)]
    descriptor: EndpointDescriptor,
    handlers: Vec<Registration>,
}

#[derive(Serialize)]
struct EndpointsResponse {
    endpoints: Vec<EndpointEntry>,
    plugins: Vec<String>,
}

pub async fn execute(args: EndpointsArgs, app: &App) -> Result<()> {
    let server = app.offline()?;

    // Plugins are declared, not running; list them by name only.
    let mut entries: Vec<EndpointEntry> = server
        .router
        .descriptors()
        .into_iter()
        .map(|descriptor| {
            let mut handlers = server.registry.lookup(descriptor.name);
            handlers.extend(
                app.config()
                    .plugins
                    .entries
                    .iter()
                    .filter(|p| {
                        p.endpoints
                            .iter()
                            .any(|e| e.eq_ignore_ascii_case(descriptor.name))
                    })
                    .map(|p| Registration {
                        language: p.language.clone(),
                        plugin: Some(p.name.clone()),
                    }),
            );
            EndpointEntry {
                descriptor,
                handlers,
            }
        })
        .collect();

    if args.handled {
        entries.retain(|e| !e.handlers.is_empty());
    }

    app.output.print_success_flat(EndpointsResponse {
        endpoints: entries,
        plugins: app
            .config()
            .plugins
            .entries
            .iter()
            .map(|p| p.name.clone())
            .collect(),
    });
    Ok(())
}
