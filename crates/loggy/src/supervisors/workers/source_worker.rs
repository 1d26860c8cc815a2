//! 🚰 The SourceWorker, the ingress loop. Poll, decode, enqueue, commit, repeat.
//!
//! It never gives up on a read failure (sleep, retry), never chokes on a bad payload
//! (log, skip), and only stops when the source runs dry or the input queue closes.

use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Worker;
use super::Enqueuer;
use crate::backends::{Source, SourceBackend};
use crate::common::LogRecord;

/// 📊 What came through the front door, and what got turned away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct IngressReport {
    pub(crate) records_enqueued: usize,
    pub(crate) decode_failures: usize,
    pub(crate) read_failures: usize,
}

#[derive(Debug)]
pub(crate) struct SourceWorker {
    source: SourceBackend,
    enqueuer: Enqueuer,
    read_backoff: Duration,
    report: IngressReport,
}

impl SourceWorker {
    pub(crate) fn new(source: SourceBackend, enqueuer: Enqueuer, read_backoff: Duration) -> Self {
        Self {
            source,
            enqueuer,
            read_backoff,
            report: IngressReport::default(),
        }
    }

    async fn run(mut self) -> Result<IngressReport> {
        loop {
            let payloads = match self.source.next_payloads().await {
                Ok(Some(payloads)) => payloads,
                Ok(None) => {
                    info!("🏁 Source ran dry after {} records", self.report.records_enqueued);
                    return Ok(self.report);
                }
                Err(err) => {
                    self.report.read_failures += 1;
                    warn!(
                        "⚠️ Read from source failed, retrying in {:?}: {:#}",
                        self.read_backoff, err
                    );
                    tokio::time::sleep(self.read_backoff).await;
                    continue;
                }
            };

            for payload in payloads {
                let record = match LogRecord::decode(&payload) {
                    Ok(record) => record,
                    Err(err) => {
                        self.report.decode_failures += 1;
                        warn!("⚠️ Skipping undecodable payload ({} bytes): {:#}", payload.len(), err);
                        continue;
                    }
                };
                // -- 🚧 this await is where backpressure lands when the engine falls behind
                if self.enqueuer.enqueue(record).await.is_err() {
                    debug!("🚪 Input queue closed, SourceWorker stepping away from the topic");
                    return Ok(self.report);
                }
                self.report.records_enqueued += 1;
            }

            if let Err(err) = self.source.commit().await {
                warn!("⚠️ Commit failed, records may be delivered again: {:#}", err);
            }
        }
    }
}

impl Worker for SourceWorker {
    type Output = IngressReport;

    fn start(self) -> JoinHandle<Result<IngressReport>> {
        tokio::spawn(self.run())
    }
}
