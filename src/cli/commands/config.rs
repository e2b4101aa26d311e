//! Config command implementation

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::app::App;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default configuration file
    Init {
        /// Initialize global config (~/.config/omnidispatch)
        #[arg(long)]
        global: bool,

        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,

    /// Show config file path
    Path {
        /// Show global config path
        #[arg(long)]
        global: bool,
    },
}

#[derive(Serialize)]
struct ConfigInitResponse {
    status: &'static str,
    path: String,
    level: &'static str,
}

#[derive(Serialize)]
struct ConfigPathResponse {
    level: &'static str,
    path: String,
    exists: bool,
}

fn level(global: bool) -> &'static str {
    if global { "global" } else { "project" }
}

pub async fn execute(args: ConfigArgs, app: &App) -> Result<()> {
    let ctx = &app.output;

    match args.command {
        ConfigCommand::Init { global, force } => {
            match app.config_service.init(global, force).await {
                Ok(path) => ctx.print_success_flat(ConfigInitResponse {
                    status: "created",
                    path: if global {
                        path.display().to_string()
                    } else {
                        ctx.relative_path(&path)
                    },
                    level: level(global),
                }),
                Err(e) => ctx.print_error(e),
            }
        }

        // Already loaded (and env-overridden) by App::new.
        ConfigCommand::Show => ctx.print_success(app.config()),

        ConfigCommand::Path { global } => {
            let path = app.config_service.config_path(global);
            ctx.print_success_flat(ConfigPathResponse {
                level: level(global),
                exists: path.exists(),
                path: path.display().to_string(),
            });
        }
    }

    Ok(())
}
