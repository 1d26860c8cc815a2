use anyhow::Result;
use async_trait::async_trait;

use crate::backends::{in_mem, kafka};

/// 🚰 A source that hands out raw payloads, one poll at a time, maximally ignorant of content.
///
/// # Contract 📜
/// - `next_payloads` returns `Ok(Some(payloads))` while data flows. An empty Vec is fine,
///   it just means the poll came back with nothing this time.
/// - `Ok(None)` = EOF. The well is dry. Kafka never says this; the in-memory source does.
/// - `Err(...)` is a read failure. The SourceWorker treats it as transient and retries.
/// - The source does NOT decode. Decoding belongs to the SourceWorker. Faucet, not chef.
/// - `commit` is called once every payload of the previous poll has been enqueued.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send {
    /// 📄 Fetch the next bunch of raw payloads.
    async fn next_payloads(&mut self) -> Result<Option<Vec<Vec<u8>>>>;
    /// ✅ Advance the read position past everything handed out so far.
    async fn commit(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Source, Kafka in production, RAM in tests.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    InMemory(in_mem::InMemorySource),
    Kafka(kafka::KafkaSource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_payloads(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        match self {
            SourceBackend::InMemory(source) => source.next_payloads().await,
            SourceBackend::Kafka(source) => source.next_payloads().await,
        }
    }

    async fn commit(&mut self) -> Result<()> {
        match self {
            SourceBackend::InMemory(source) => source.commit().await,
            SourceBackend::Kafka(source) => source.commit().await,
        }
    }
}
