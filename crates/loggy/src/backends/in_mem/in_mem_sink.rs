use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::trace;

use crate::backends::Sink;
use crate::common::LogRecord;

/// 📦 The in-memory sink takes no knobs. It is an empty table in TOML and proud of it.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemorySinkConfig {}

/// 📦 A sink that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// `InMemorySink` hoards every batch it receives in a shared Vec wrapped in a Mutex
/// wrapped in an Arc. Clone-able because tests need to peek inside after handing
/// `self` off to the SinkWorker. The `Arc` means everyone shares the same Vec.
///
/// It can also be told to fail the next N sends, so we can watch the SinkWorker
/// drop a batch and carry on like nothing happened. Because nothing did. Officially.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySink {
    /// 🔒 The evidence locker. One entry per successful `send`, in arrival order.
    pub(crate) received: Arc<Mutex<Vec<Vec<LogRecord>>>>,
    /// 📞 Every `send` call, successful or not. Failed attempts show up here and nowhere else.
    pub(crate) attempts: Arc<AtomicUsize>,
    failures_remaining: Arc<AtomicUsize>,
    pub(crate) closed: Arc<AtomicUsize>,
    // -- 🚪 when set, `close` says no
    refuse_close: bool,
}

impl InMemorySink {
    pub(crate) async fn new() -> Result<Self> {
        Ok(Self::default())
    }

    /// 🧪 A sink that fails its next `failures` sends, then behaves.
    #[cfg(test)]
    pub(crate) fn failing(failures: usize) -> Self {
        let sink = Self::default();
        sink.failures_remaining.store(failures, Ordering::SeqCst);
        sink
    }

    /// 🧪 A sink that takes batches fine but falls over when asked to close.
    #[cfg(test)]
    pub(crate) fn refusing_to_close() -> Self {
        Self {
            refuse_close: true,
            ..Self::default()
        }
    }

    /// 📏 Sizes of every batch received so far, in order. Test assertions love this.
    #[cfg(test)]
    pub(crate) async fn batch_sizes(&self) -> Vec<usize> {
        self.received.lock().await.iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, batch: Vec<LogRecord>) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!(
                "💀 The in-memory sink refused a batch of {} records. It was told to. It enjoyed it a little.",
                batch.len()
            );
        }
        trace!("📥 in-memory sink stashing {} records", batch.len());
        // 🔒 The Mutex is load-bearing. Do not remove. I know it looks optional. It isn't.
        self.received.lock().await.push(batch);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // -- 🗑️ Cleanup routine: [REDACTED, there is nothing here]
        let times_closed = self.closed.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(
            "🗑️ in-memory sink closed (x{}) holding {} batches from {} attempts",
            times_closed,
            self.received.lock().await.len(),
            self.attempts.load(Ordering::SeqCst)
        );
        if self.refuse_close {
            anyhow::bail!("💀 The in-memory sink would rather not close. It was told to be difficult.");
        }
        Ok(())
    }
}
