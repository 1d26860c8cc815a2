//! 🔧 App Configuration, the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing.", every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `LOGGY_*` environment variables first, the TOML file on top.
//! Nested keys use a double underscore, e.g. `LOGGY_BATCHING__BATCH_SIZE=500`.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

pub use crate::backends::{
    ElasticsearchSinkConfig, InMemorySinkConfig, InMemorySourceConfig, KafkaSourceConfig,
};
use crate::supervisors::workers::BatchingConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🚰 Where records come from.
    pub source_config: SourceConfig,
    /// 🕳️ Where batches go.
    pub sink_config: SinkConfig,
    /// ⏰ How the engine batches in between.
    pub batching: BatchSettings,
}

/// 🚰 Pick exactly one source. `[source_config.Kafka]` in production.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    Kafka(KafkaSourceConfig),
    InMemory(InMemorySourceConfig),
}

impl SourceConfig {
    /// 🔄 Sleep between a failed read and the next one.
    pub(crate) fn read_backoff(&self) -> Duration {
        match self {
            SourceConfig::Kafka(kafka) => Duration::from_millis(kafka.read_backoff_ms),
            // -- 🧪 RAM does not need a nap
            SourceConfig::InMemory(_) => Duration::from_millis(10),
        }
    }
}

/// 🕳️ Pick exactly one sink. `[sink_config.Elasticsearch]` in production.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    Elasticsearch(ElasticsearchSinkConfig),
    InMemory(InMemorySinkConfig),
}

/// ⏰ Batching knobs as they appear in the file. `batch_size` and `flush_interval_secs`
/// have no defaults on purpose: pick them.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchSettings {
    #[serde(alias = "batchSize", alias = "maxBatchSize")]
    pub batch_size: usize,
    #[serde(alias = "flushInterval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_input_capacity", alias = "inputCapacity")]
    pub input_capacity: usize,
    #[serde(default)]
    pub max_flush_retries: usize,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

// -- 🚧 ten thousand records of slack before ingestion has to wait
fn default_input_capacity() -> usize {
    10_000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl BatchSettings {
    /// ✅ Validate and convert into what the engine actually runs on.
    pub(crate) fn batching_config(&self) -> anyhow::Result<BatchingConfig> {
        if self.batch_size == 0 {
            anyhow::bail!("💀 batching.batch_size must be at least 1. A batch of zero is just a meeting with no attendees.");
        }
        if self.flush_interval_secs == 0 {
            anyhow::bail!("💀 batching.flush_interval_secs must be at least 1. A zero-second timer is a busy loop in a trench coat.");
        }
        if self.input_capacity == 0 {
            anyhow::bail!("💀 batching.input_capacity must be at least 1. A queue that holds nothing holds everyone up.");
        }
        Ok(BatchingConfig {
            max_batch_size: self.batch_size,
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            input_capacity: self.input_capacity,
            max_flush_retries: self.max_flush_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        })
    }
}

/// 🚀 Load the config, env vars (`LOGGY_*`) merged with the TOML file. TOML wins on conflicts.
///
/// 💀 Returns an error if the file is missing, unparseable, or the batching knobs are nonsense.
/// Every one of those is a startup failure, and the process exits non-zero.
pub fn load_config(config_file: &Path) -> anyhow::Result<AppConfig> {
    info!("🔧 Loading configuration: {}", config_file.display());

    if !config_file.is_file() {
        anyhow::bail!(
            "💀 Configuration file '{}' does not exist. Double check the path, or use an absolute one, to be absolutely certain.",
            config_file.display()
        );
    }

    let app_config: AppConfig = Figment::new()
        .merge(Env::prefixed("LOGGY_").split("__"))
        .merge(Toml::file(config_file))
        .extract()
        .context(format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LOGGY_*). \
             Something is missing, misspelled, or the wrong type. Check the cause below.",
            config_file.display()
        ))?;

    app_config
        .batching
        .batching_config()
        .context("💀 The batching section parsed, but the numbers in it don't make sense.")?;

    Ok(app_config)
}
