use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;

use crate::backends::Source;

/// 📦 Config for the in-memory source: the payloads, verbatim, as the queue would send them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemorySourceConfig {
    #[serde(default)]
    pub payloads: Vec<String>,
    /// 🔁 Act like a live topic: once the payloads are gone, keep answering with quiet
    /// polls instead of EOF. The process then runs until it is told to stop.
    #[serde(default)]
    pub keep_open: bool,
}

// -- 😴 a quiet poll still takes a moment, like a broker with nothing to say
const QUIET_POLL: Duration = Duration::from_millis(10);

/// 🚰 The world's most predictable queue.
///
/// Hands out every configured payload in one poll, then reports EOF forever after
/// (or, with `keep_open`, comes back empty-handed forever after).
/// Can be told to fail its first few reads so the retry path gets some exercise.
#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    pending: VecDeque<Vec<u8>>,
    // -- 💀 how many reads still have to fail before we behave
    read_failures_remaining: usize,
    keep_open: bool,
    pub(crate) commits: usize,
}

impl InMemorySource {
    pub(crate) async fn new(config: InMemorySourceConfig) -> Result<Self> {
        Ok(Self {
            pending: config.payloads.into_iter().map(String::into_bytes).collect(),
            read_failures_remaining: 0,
            keep_open: config.keep_open,
            commits: 0,
        })
    }

    /// 🧪 Same as `new`, but the first `failures` reads blow up.
    #[cfg(test)]
    pub(crate) fn with_read_failures(payloads: Vec<Vec<u8>>, failures: usize) -> Self {
        Self {
            pending: payloads.into(),
            read_failures_remaining: failures,
            keep_open: false,
            commits: 0,
        }
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn next_payloads(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        if self.read_failures_remaining > 0 {
            self.read_failures_remaining -= 1;
            anyhow::bail!("💀 The in-memory queue hiccuped on purpose. It was asked to. It obliged.");
        }
        if self.pending.is_empty() {
            if self.keep_open {
                tokio::time::sleep(QUIET_POLL).await;
                return Ok(Some(Vec::new()));
            }
            // -- 🏁 EOF. The golden retriever goes home.
            return Ok(None);
        }
        trace!("📄 in-memory source handing out {} payloads", self.pending.len());
        Ok(Some(self.pending.drain(..).collect()))
    }

    async fn commit(&mut self) -> Result<()> {
        self.commits += 1;
        trace!("✅ in-memory source commit #{}", self.commits);
        Ok(())
    }
}
