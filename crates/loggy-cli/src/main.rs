//! 🚀 loggy-cli, the front door, the bouncer, the maitre d' of loggy.
//!
//! 📦 Parses the one argument we need, sets up logging, loads config, and then lets
//! the real code do the heavy lifting. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🪵 Consume log records from Kafka and bulk-index them into Elasticsearch.
#[derive(Debug, Parser)]
#[command(name = "loggy-consumer", version, about)]
struct Cli {
    /// 📄 Path to the TOML configuration file
    config: PathBuf,
}

/// 🚀 main(), where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args (exactly one, and it's not optional)
/// 3. Load config (the moment of truth)
/// 4. Run the thing until SIGINT/SIGTERM
/// 5. Exit 1 on startup failure, 0 otherwise
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 RUST_LOG if you have opinions, `info` if you don't
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match loggy::app_config::load_config(&cli.config)
        .context("💀 In loggy-cli, main, we couldn't load the config file. Take a look at it, something obvious is hiding in there.")
    {
        Ok(app_config) => loggy::run(app_config).await,
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("onnection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like Elasticsearch isn't reachable. Double-check that it is actually \
                running and that the url in the config points at it. If you're using Docker, try \
                `docker ps` to see what's up. Even servers need a nudge sometimes. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}
