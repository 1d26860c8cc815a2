use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use kafka::client::KafkaClient;
use kafka::consumer::{Consumer, FetchOffset, GroupOffsetStorage};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::backends::Source;

/// 🐘 Where the logs come from: brokers, one topic, one consumer group.
#[derive(Debug, Deserialize, Clone)]
pub struct KafkaSourceConfig {
    /// 📡 `host:port`, as many as you've got.
    pub brokers: Vec<String>,
    pub topic: String,
    #[serde(alias = "groupID", alias = "groupId")]
    pub group_id: String,
    /// ⏱️ How long a fetch may sit on the broker waiting for data.
    #[serde(default = "default_fetch_max_wait_ms")]
    pub fetch_max_wait_ms: u64,
    /// 🔄 Fixed sleep between a failed read and the next attempt.
    #[serde(default = "default_read_backoff_ms")]
    pub read_backoff_ms: u64,
}

fn default_fetch_max_wait_ms() -> u64 {
    200
}

// -- 😴 one second. long enough for a broker to reboot its attitude, short enough to not lose sleep.
fn default_read_backoff_ms() -> u64 {
    1000
}

/// 🚰 Kafka-backed source. The consumer is created lazily, on the first poll, so a broker
/// that is down at startup is just another transient read failure.
pub(crate) struct KafkaSource {
    config: KafkaSourceConfig,
    // -- 🔄 `None` while the consumer is away on the blocking pool, or before it exists.
    consumer: Option<Consumer>,
}

impl std::fmt::Debug for KafkaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 🔧 kafka::consumer::Consumer does not implement Debug. We report whether it exists.
        f.debug_struct("KafkaSource")
            .field("config", &self.config)
            .field("connected", &self.consumer.is_some())
            .finish()
    }
}

impl KafkaSource {
    pub(crate) async fn new(config: KafkaSourceConfig) -> Result<Self> {
        let lookup_config = config.clone();
        let partitions =
            tokio::task::spawn_blocking(move || topic_partition_count(&lookup_config)).await;
        match partitions {
            Ok(Ok(count)) => info!(
                "🐘 Topic '{}' has {} partitions, consuming as group '{}'",
                config.topic, count, config.group_id
            ),
            Ok(Err(err)) => warn!(
                "⚠️ Could not look up partitions for topic '{}': {:#}. Carrying on, the consumer will retry.",
                config.topic, err
            ),
            Err(err) => warn!("⚠️ Partition lookup task fell over: {}", err),
        }
        Ok(Self {
            config,
            consumer: None,
        })
    }

    /// 🏗️ Build the consumer. Offsets live in Kafka under our group; no stored offset means earliest.
    fn connect(config: &KafkaSourceConfig) -> Result<Consumer> {
        Consumer::from_hosts(config.brokers.clone())
            .with_topic(config.topic.clone())
            .with_group(config.group_id.clone())
            .with_fallback_offset(FetchOffset::Earliest)
            .with_offset_storage(Some(GroupOffsetStorage::Kafka))
            .with_fetch_max_wait_time(Duration::from_millis(config.fetch_max_wait_ms))
            .with_fetch_min_bytes(1)
            .create()
            .context(format!(
                "💀 Could not create a Kafka consumer for topic '{}' on brokers {:?}. The brokers are either down or pretending to be.",
                config.topic, config.brokers
            ))
    }

    /// 🧵 Run one blocking operation against the consumer on the blocking pool.
    ///
    /// The consumer is moved out, used, and moved back. If the operation fails the consumer
    /// is dropped, so the next call reconnects from scratch.
    async fn with_consumer<T, F>(&mut self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut Consumer) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let existing = self.consumer.take();
        let config = self.config.clone();
        let (consumer, result) = tokio::task::spawn_blocking(move || {
            let mut consumer = match existing {
                Some(consumer) => consumer,
                None => match Self::connect(&config) {
                    Ok(consumer) => consumer,
                    Err(err) => return (None, Err(err)),
                },
            };
            let result = operation(&mut consumer);
            match result {
                Ok(value) => (Some(consumer), Ok(value)),
                Err(err) => (None, Err(err)),
            }
        })
        .await
        .context("💀 The blocking Kafka task panicked or was cancelled. The consumer went with it.")?;
        self.consumer = consumer;
        result
    }
}

/// 🔢 Ask the cluster how many partitions the topic has. Informational only.
fn topic_partition_count(config: &KafkaSourceConfig) -> Result<usize> {
    let mut client = KafkaClient::new(config.brokers.clone());
    client
        .load_metadata(&[config.topic.as_str()])
        .context("💀 Metadata request failed")?;
    client
        .topics()
        .partitions(&config.topic)
        .map(|partitions| partitions.len())
        .context(format!("💀 Topic '{}' is not in the metadata", config.topic))
}

#[async_trait]
impl Source for KafkaSource {
    async fn next_payloads(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        let payloads = self
            .with_consumer(|consumer| {
                let message_sets = consumer
                    .poll()
                    .context("💀 Kafka poll failed. The topic is there, the bytes are not.")?;
                let mut payloads = Vec::new();
                for message_set in message_sets.iter() {
                    payloads.extend(message_set.messages().iter().map(|m| m.value.to_vec()));
                    consumer
                        .consume_messageset(message_set)
                        .context("💀 Could not mark a message set as consumed")?;
                }
                Ok(payloads)
            })
            .await?;
        trace!("📄 Kafka poll returned {} payloads", payloads.len());
        // -- 🐘 Kafka never runs dry. It only runs quiet.
        Ok(Some(payloads))
    }

    async fn commit(&mut self) -> Result<()> {
        if self.consumer.is_none() {
            return Ok(());
        }
        self.with_consumer(|consumer| {
            consumer
                .commit_consumed()
                .context("💀 Offset commit failed. The group will re-deliver; at-least-once says hi.")
        })
        .await?;
        debug!("✅ Kafka offsets committed for group '{}'", self.config.group_id);
        Ok(())
    }
}
