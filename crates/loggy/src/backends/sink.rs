use anyhow::Result;
use async_trait::async_trait;

use crate::backends::{elasticsearch, in_mem};
use crate::common::LogRecord;

/// 🕳️ A sink that writes whole batches of records somewhere durable.
///
/// The drain at the bottom of the pipeline tub. The SinkWorker owns the buffer and
/// decides WHEN to flush; the sink only decides WHERE the records go and HOW.
///
/// # Contract 📜
/// - `send` takes ownership of a batch. The caller keeps nothing. If the sink splits the
///   batch into per-index groups, a failing group must not stop the others, and any
///   failure comes back as one aggregate error.
/// - `send` does not retry. Retries (if configured) belong to the SinkWorker.
/// - `close` releases whatever the sink holds. MUST be called. Skipping it is rude.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug + Send {
    /// 📡 Persist one batch. All of it, or an error saying which parts did not make it.
    async fn send(&mut self, batch: Vec<LogRecord>) -> Result<()>;
    /// 🗑️ Finalize and release. Call this. Always. Not even Fridays are exempt.
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Sink. The supervisor never needs to know which one it got.
#[derive(Debug)]
pub(crate) enum SinkBackend {
    InMemory(in_mem::InMemorySink),
    Elasticsearch(elasticsearch::ElasticsearchSink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, batch: Vec<LogRecord>) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.send(batch).await,
            SinkBackend::Elasticsearch(sink) => sink.send(batch).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::Elasticsearch(sink) => sink.close().await,
        }
    }
}
