//! 🎬 *[a channel fills with log records. somewhere, a timer ticks.]*
//! *[the clock on the wall reads 2:47am.]*
//! *[nobody asked for three hundred "user logged in" lines per second. and yet, here we are.]*
//!
//! 🗑️ The SinkWorker module, the batching engine. It owns the buffer. Nobody else
//! touches the buffer. It appends, and when the buffer is full OR the timer fires, it
//! detaches the whole thing and hands it to the sink in one go.
//!
//! 🧠 Knowledge graph:
//! - Input: a bounded `async_channel` of [`LogRecord`]s. `Enqueuer` is the only way in.
//!   When the channel is full, `enqueue` waits. That wait is the backpressure, all the
//!   way back to the Kafka poll loop.
//! - Events: record arrived, timer ticked, channel closed. Whichever is ready first wins.
//! - Flush: `mem::replace` the buffer, then `sink.send(batch)`. One flush at a time.
//! - Failure: log it, drop the batch (after the optional retries), keep going.
//! - Close: one last flush of whatever is left, `sink.close()`, then the JoinHandle
//!   resolves with a [`FlushReport`]. That is the completion signal.
//!
//! 🦆 (the duck has no comment at this time)

use std::time::Duration;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::backends::{Sink, SinkBackend};
use crate::common::LogRecord;

/// 🔧 The engine's knobs. No defaults here; the config layer decides, this just obeys.
#[derive(Debug, Clone)]
pub(crate) struct BatchingConfig {
    /// 📦 Flush as soon as the buffer holds this many records.
    pub(crate) max_batch_size: usize,
    /// ⏰ Flush whatever is buffered every time this elapses.
    pub(crate) flush_interval: Duration,
    /// 🚧 Capacity of the input queue. Full queue = `enqueue` waits.
    pub(crate) input_capacity: usize,
    /// 🔄 Extra attempts for a failed batch. 0 = drop on first failure.
    pub(crate) max_flush_retries: usize,
    pub(crate) retry_backoff: Duration,
}

/// 🎯 Why a flush happened. Shows up in logs and in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushTrigger {
    /// 📦 buffer hit `max_batch_size`
    Full,
    /// ⏰ the interval elapsed
    Timer,
    /// 🏁 input queue closed, last call
    Drain,
}

/// 📊 What the engine did with its life. Counts only non-empty flushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FlushReport {
    pub(crate) full_flushes: usize,
    pub(crate) timer_flushes: usize,
    pub(crate) drain_flushes: usize,
    pub(crate) failed_flushes: usize,
    pub(crate) records_delivered: usize,
    pub(crate) records_dropped: usize,
    pub(crate) retries: usize,
}

impl FlushReport {
    pub(crate) fn flushes(&self) -> usize {
        self.full_flushes + self.timer_flushes + self.drain_flushes
    }

    fn count(&mut self, trigger: FlushTrigger) {
        match trigger {
            FlushTrigger::Full => self.full_flushes += 1,
            FlushTrigger::Timer => self.timer_flushes += 1,
            FlushTrigger::Drain => self.drain_flushes += 1,
        }
    }
}

/// 📮 The front door of the engine. Clone it, hand it to whoever produces records.
#[derive(Debug, Clone)]
pub(crate) struct Enqueuer {
    tx: Sender<LogRecord>,
}

impl Enqueuer {
    /// 📥 Hand one record to the engine. Waits while the queue is full; never drops.
    /// Only fails once the queue has been closed.
    pub(crate) async fn enqueue(&self, record: LogRecord) -> Result<()> {
        self.tx
            .send(record)
            .await
            .context("💀 The input queue is closed. The engine is draining, no new guests.")
    }

    /// 🚪 Close the queue. Records already inside still get flushed.
    pub(crate) fn close(&self) -> bool {
        self.tx.close()
    }
}

/// 🗑️ The SinkWorker: takes records from a channel, buffers them, flushes them into a backend.
#[derive(Debug)]
pub(crate) struct SinkWorker {
    rx: Receiver<LogRecord>,
    sink: SinkBackend,
    config: BatchingConfig,
    report: FlushReport,
}

impl SinkWorker {
    /// 🏗️ Builds the engine and its bounded input queue. Returns the only way to feed it.
    pub(crate) fn new(config: BatchingConfig, sink: SinkBackend) -> (Self, Enqueuer) {
        let (tx, rx) = async_channel::bounded(config.input_capacity);
        let worker = Self {
            rx,
            sink,
            config,
            report: FlushReport::default(),
        };
        (worker, Enqueuer { tx })
    }

    /// 🔄 The event loop. Single task, single owner of `buffer`.
    async fn run(mut self) -> Result<FlushReport> {
        let rx = self.rx.clone();
        let mut buffer: Vec<LogRecord> = Vec::with_capacity(self.config.max_batch_size);
        // -- ⏰ first tick one full interval from now, not immediately
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.config.flush_interval,
            self.config.flush_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            "📥 SinkWorker started: batch size {}, flush interval {:?}, queue capacity {}",
            self.config.max_batch_size, self.config.flush_interval, self.config.input_capacity
        );

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(record) => {
                        buffer.push(record);
                        if buffer.len() >= self.config.max_batch_size {
                            self.flush(&mut buffer, FlushTrigger::Full).await;
                        }
                    }
                    Err(_) => {
                        // -- 🏁 closed and empty
                        self.flush(&mut buffer, FlushTrigger::Drain).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush(&mut buffer, FlushTrigger::Timer).await;
                }
            }
        }

        // -- 🏁 the drain already happened; a sink that won't close doesn't undo it
        match self.sink.close().await {
            Ok(()) => debug!("🏁 SinkWorker: channel closed, buffer drained, sink closed. Shutting down."),
            Err(err) => error!(
                "💀 SinkWorker drained everything and then the sink refused to close. So close. Literally: {:#}",
                err
            ),
        }
        Ok(self.report)
    }

    /// 🚽 Detach the buffer and send it. An empty buffer is a no-op, not a request.
    ///
    /// Never returns an error: a batch that still fails after the retries is logged and dropped.
    async fn flush(&mut self, buffer: &mut Vec<LogRecord>, trigger: FlushTrigger) {
        if buffer.is_empty() {
            return;
        }
        let mut batch = std::mem::replace(buffer, Vec::with_capacity(self.config.max_batch_size));
        let records = batch.len();
        self.report.count(trigger);
        debug!("🪣 Flushing {} records ({:?})", records, trigger);

        let mut attempt = 0;
        let outcome = loop {
            // -- 🔄 only clone when another attempt might need the batch
            let attempt_batch = if attempt < self.config.max_flush_retries {
                batch.clone()
            } else {
                std::mem::take(&mut batch)
            };
            match self.sink.send(attempt_batch).await {
                Ok(()) => break Ok(()),
                Err(err) if attempt < self.config.max_flush_retries => {
                    attempt += 1;
                    self.report.retries += 1;
                    warn!(
                        "⚠️ Flush of {} records failed, retry {}/{} in {:?}: {:#}",
                        records, attempt, self.config.max_flush_retries, self.config.retry_backoff, err
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(()) => {
                self.report.records_delivered += records;
                debug!("✅ Flushed {} records ({:?})", records, trigger);
            }
            Err(err) => {
                self.report.failed_flushes += 1;
                self.report.records_dropped += records;
                error!(
                    "💀 Dropping {} records after a failed flush ({:?}): {:#}",
                    records, trigger, err
                );
            }
        }
    }
}

impl Worker for SinkWorker {
    type Output = FlushReport;

    fn start(self) -> JoinHandle<Result<FlushReport>> {
        tokio::spawn(async move {
            let report = self.run().await?;
            info!(
                "📊 SinkWorker done: {} flushes, {} records delivered, {} dropped",
                report.flushes(),
                report.records_delivered,
                report.records_dropped
            );
            Ok(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ElasticsearchSinkConfig;
    use crate::backends::elasticsearch::ElasticsearchSink;
    use crate::backends::in_mem::InMemorySink;
    use crate::common::tests::record_at;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    const AN_HOUR: Duration = Duration::from_secs(3600);

    fn config(max_batch_size: usize, flush_interval: Duration) -> BatchingConfig {
        BatchingConfig {
            max_batch_size,
            flush_interval,
            input_capacity: 64,
            max_flush_retries: 0,
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn numbered(count: usize) -> Vec<LogRecord> {
        (0..count).map(|n| record_at(&n.to_string(), 2024, 1, 1)).collect()
    }

    async fn feed_and_close(enqueuer: &Enqueuer, records: Vec<LogRecord>) -> Result<()> {
        for record in records {
            enqueuer.enqueue(record).await?;
        }
        enqueuer.close();
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_full_batches_flush_by_size() -> Result<()> {
        let sink = InMemorySink::new().await?;
        let (worker, enqueuer) = SinkWorker::new(config(3, AN_HOUR), SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        feed_and_close(&enqueuer, numbered(9)).await?;
        let report = handle.await??;

        assert_eq!(sink.batch_sizes().await, vec![3, 3, 3]);
        assert_eq!(report.full_flushes, 3);
        // -- 🏁 nothing left at close, so no drain call at all
        assert_eq!(report.drain_flushes, 0);
        assert_eq!(sink.attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_batches_partition_the_stream_in_order() -> Result<()> {
        let sink = InMemorySink::new().await?;
        let (worker, enqueuer) = SinkWorker::new(config(4, AN_HOUR), SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        let records = numbered(10);
        feed_and_close(&enqueuer, records.clone()).await?;
        let report = handle.await??;

        let received = sink.received.lock().await;
        assert!(received.iter().all(|batch| batch.len() <= 4));
        let replayed: Vec<LogRecord> = received.iter().flatten().cloned().collect();
        assert_eq!(replayed, records, "batches must be disjoint and in enqueue order");
        assert_eq!(report.full_flushes, 2);
        assert_eq!(report.drain_flushes, 1);
        assert_eq!(report.records_delivered, 10);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_timer_flushes_a_lonely_record_exactly_once() -> Result<()> {
        let sink = InMemorySink::new().await?;
        let (worker, enqueuer) =
            SinkWorker::new(config(3, Duration::from_secs(2)), SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        enqueuer.enqueue(record_at("lonely", 2024, 1, 1)).await?;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(sink.batch_sizes().await, vec![1]);

        // -- ⏰ another tick with nothing buffered: no call to the sink
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.attempts.load(std::sync::atomic::Ordering::SeqCst), 1);

        enqueuer.close();
        let report = handle.await??;
        assert_eq!(report.timer_flushes, 1);
        assert_eq!(report.flushes(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_closing_drains_the_leftovers() -> Result<()> {
        let sink = InMemorySink::new().await?;
        let (worker, enqueuer) = SinkWorker::new(config(10, AN_HOUR), SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        feed_and_close(&enqueuer, numbered(4)).await?;
        let report = handle.await??;

        assert_eq!(sink.batch_sizes().await, vec![4]);
        assert_eq!(report.drain_flushes, 1);
        assert_eq!(sink.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_drain_still_says_goodbye() -> Result<()> {
        let sink = InMemorySink::new().await?;
        let (worker, enqueuer) = SinkWorker::new(config(10, AN_HOUR), SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        enqueuer.close();
        let report = handle.await??;

        assert_eq!(sink.attempts.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(report, FlushReport::default());
        assert_eq!(sink.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_stubborn_close_still_hands_back_the_report() -> Result<()> {
        let sink = InMemorySink::refusing_to_close();
        let (worker, enqueuer) = SinkWorker::new(config(10, AN_HOUR), SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        feed_and_close(&enqueuer, numbered(2)).await?;
        let report = handle.await??;

        assert_eq!(report.drain_flushes, 1);
        assert_eq!(report.records_delivered, 2);
        assert_eq!(sink.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_enqueue_after_close_is_refused() -> Result<()> {
        let sink = InMemorySink::new().await?;
        let (worker, enqueuer) = SinkWorker::new(config(10, AN_HOUR), SinkBackend::InMemory(sink));
        let handle = worker.start();
        enqueuer.close();
        assert!(enqueuer.enqueue(record_at("late", 2024, 1, 1)).await.is_err());
        handle.await??;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_failed_flush_is_dropped_and_life_goes_on() -> Result<()> {
        let sink = InMemorySink::failing(1);
        let (worker, enqueuer) = SinkWorker::new(config(2, AN_HOUR), SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        let records = numbered(4);
        feed_and_close(&enqueuer, records.clone()).await?;
        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("💀 the engine deadlocked after a sink failure")??;

        let received = sink.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], records[2..].to_vec());
        assert_eq!(report.failed_flushes, 1);
        assert_eq!(report.records_dropped, 2);
        assert_eq!(report.records_delivered, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_retries_rescue_a_flaky_sink() -> Result<()> {
        let sink = InMemorySink::failing(2);
        let mut retrying = config(3, AN_HOUR);
        retrying.max_flush_retries = 2;
        let (worker, enqueuer) = SinkWorker::new(retrying, SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        feed_and_close(&enqueuer, numbered(3)).await?;
        let report = handle.await??;

        assert_eq!(sink.batch_sizes().await, vec![3]);
        assert_eq!(report.retries, 2);
        assert_eq!(report.failed_flushes, 0);
        assert_eq!(sink.attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_retries_run_out() -> Result<()> {
        let sink = InMemorySink::failing(5);
        let mut retrying = config(3, AN_HOUR);
        retrying.max_flush_retries = 1;
        let (worker, enqueuer) = SinkWorker::new(retrying, SinkBackend::InMemory(sink.clone()));
        let handle = worker.start();

        feed_and_close(&enqueuer, numbered(3)).await?;
        let report = handle.await??;

        assert!(sink.batch_sizes().await.is_empty());
        assert_eq!(report.retries, 1);
        assert_eq!(report.records_dropped, 3);
        assert_eq!(sink.attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_full_queue_makes_enqueue_wait() -> Result<()> {
        let sink = InMemorySink::new().await?;
        let mut tiny = config(100, AN_HOUR);
        tiny.input_capacity = 1;
        let (worker, enqueuer) = SinkWorker::new(tiny, SinkBackend::InMemory(sink.clone()));

        // -- 🚧 engine not started yet: the single slot fills, the next enqueue has to wait
        enqueuer.enqueue(record_at("first", 2024, 1, 1)).await?;
        let waiting = enqueuer.clone();
        let pending = tokio::spawn(async move { waiting.enqueue(record_at("second", 2024, 1, 1)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished(), "enqueue should block on a full queue, not drop");

        let handle = worker.start();
        pending.await??;
        enqueuer.close();
        let report = handle.await??;

        assert_eq!(report.records_delivered, 2);
        assert_eq!(sink.batch_sizes().await, vec![2]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_three_records_become_two_destination_groups() -> Result<()> {
        let server = crate::backends::elasticsearch::tests::mock_cluster().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "errors": false, "items": [] })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let sink_config: ElasticsearchSinkConfig =
            crate::backends::elasticsearch::tests::sink_config(server.uri());
        let sink = ElasticsearchSink::new(sink_config).await?;
        let (worker, enqueuer) = SinkWorker::new(config(3, AN_HOUR), SinkBackend::Elasticsearch(sink));
        let handle = worker.start();

        feed_and_close(
            &enqueuer,
            vec![
                record_at("a", 2024, 1, 1),
                record_at("b", 2024, 1, 1),
                record_at("c", 2024, 1, 2),
            ],
        )
        .await?;
        let report = handle.await??;
        assert_eq!(report.full_flushes, 1);
        assert_eq!(report.records_delivered, 3);

        let bulk_bodies: Vec<String> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == "/_bulk")
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect();
        assert_eq!(bulk_bodies.len(), 2);
        assert_eq!(bulk_bodies[0].matches("loggy-logs-2024.01.01").count(), 2);
        assert_eq!(bulk_bodies[1].matches("loggy-logs-2024.01.02").count(), 1);
        Ok(())
    }
}
