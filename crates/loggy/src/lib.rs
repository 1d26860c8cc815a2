//! 🪵 loggy, a log-shipping bridge. Kafka topic in, daily Elasticsearch indices out,
//! and a batching engine in the middle deciding when "enough" is enough.

pub mod app_config;
mod backends;
mod common;
mod supervisors;

use anyhow::{Context, Result};

pub use crate::app_config::AppConfig;
pub use crate::common::LogRecord;
use crate::supervisors::Supervisor;

/// 🚀 Ship logs until told to stop, then drain. Errors here are startup errors.
pub async fn run(app_config: AppConfig) -> Result<()> {
    Supervisor::new(app_config)
        .run()
        .await
        .context("💀 loggy could not get the pipeline off the ground")?;
    Ok(())
}
