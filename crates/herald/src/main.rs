// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Herald - multi-tenant WhatsApp bulk-send service.
//!
//! This is the binary entry point.

mod report;
mod serve;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use herald_config::HeraldConfig;

/// Herald - multi-tenant WhatsApp bulk-send service.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker pool, retry poller, and rollup runner.
    Serve,
    /// Show progress of one campaign.
    Stats {
        campaign_id: String,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Recompute the daily rollup for one day (default: today, UTC).
    Rollup {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Validate and print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => herald_config::load_and_validate_path(path),
        None => herald_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            herald_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Stats { campaign_id, json }) => {
            report::run_stats(&config, &campaign_id, json).await
        }
        Some(Commands::Rollup { date }) => report::run_rollup(&config, date).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&redacted(config)) {
                Ok(rendered) => print!("{rendered}"),
                Err(e) => {
                    eprintln!("error: failed to render configuration: {e}");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        None => {
            println!("herald: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Masks access tokens so the printed configuration is safe to share.
fn redacted(mut config: HeraldConfig) -> HeraldConfig {
    const MASK: &str = "********";
    let whatsapp = &mut config.whatsapp;
    if let Some(account) = whatsapp.default_account.as_mut() {
        account.access_token = MASK.to_string();
    }
    for account in whatsapp.accounts.values_mut() {
        account.access_token = MASK.to_string();
    }
    config
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("herald={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
