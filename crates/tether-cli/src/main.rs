//! # tether
//!
//! Command-line client for the tether backend: one subcommand per HTTP
//! endpoint plus `watch`, which follows a WebSocket channel.

#![deny(unsafe_code)]

mod watch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tether_http::{
    BackendApi, BatchExecuteRequest, ExecuteOptions, ExportFormat, ExportRequest, RequestClient,
    RequestClientConfig,
};
use tether_settings::TetherSettings;

/// Client for the tether backend.
#[derive(Parser, Debug)]
#[command(name = "tether", about = "Client for the tether backend", version)]
struct Cli {
    /// Backend base address (overrides settings).
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log level filter (overrides settings; `RUST_LOG` wins over both).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check backend health.
    Health,
    /// List items.
    Items {
        /// Only items in this category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Execute one item.
    Execute {
        /// Item name.
        name: String,
        /// Execute options as a JSON object.
        #[arg(long)]
        options: Option<String>,
    },
    /// Execute several items.
    Batch {
        /// Item names.
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show an item's status.
    Status {
        /// Item name.
        name: String,
    },
    /// Export an item.
    Export {
        /// Item name.
        name: String,
        /// Output format: pdf, png, pptx, html.
        #[arg(long)]
        format: ExportFormat,
        /// Format-specific quality.
        #[arg(long)]
        quality: Option<u32>,
        /// Page selection such as `1-3,5`.
        #[arg(long)]
        pages: Option<String>,
    },
    /// Show backend metrics.
    Metrics,
    /// Follow a channel and print its events until Ctrl-C.
    Watch {
        /// Follow this item instead of the server channel.
        #[arg(long)]
        item: Option<String>,
    },
}

impl Cli {
    /// Settings with command-line overrides applied.
    fn settings(&self, base: &TetherSettings) -> TetherSettings {
        let mut settings = base.clone();
        if let Some(url) = &self.base_url {
            settings.http.base_url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings
    }
}

fn parse_options(raw: Option<&str>) -> Result<ExecuteOptions> {
    let Some(raw) = raw else {
        return Ok(ExecuteOptions::default());
    };
    let object: Map<String, Value> =
        serde_json::from_str(raw).context("--options must be a JSON object")?;
    serde_json::from_value(Value::Object(object)).context("invalid execute options")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings(tether_settings::get_settings());
    tether_core::logging::init_subscriber(&settings.logging.level);

    let api = BackendApi::new(RequestClient::new(RequestClientConfig::from(&settings.http)));

    match cli.command {
        Command::Health => print_json(&api.health().await?)?,
        Command::Items { category } => print_json(&api.list_items(category.as_deref()).await?)?,
        Command::Execute { name, options } => {
            let options = parse_options(options.as_deref())?;
            print_json(&api.execute_item(&name, &options).await?)?;
        }
        Command::Batch { names } => {
            let request = BatchExecuteRequest {
                names,
                options: ExecuteOptions::default(),
            };
            print_json(&api.batch_execute(&request).await?)?;
        }
        Command::Status { name } => print_json(&api.item_status(&name).await?)?,
        Command::Export {
            name,
            format,
            quality,
            pages,
        } => {
            let request = ExportRequest {
                format,
                quality,
                pages,
            };
            print_json(&api.export_item(&name, &request).await?)?;
        }
        Command::Metrics => print_json(&api.metrics().await?)?,
        Command::Watch { item } => watch::run(&settings, item).await?,
    }

    Ok(())
}
