//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module, part middle manager, part helicopter parent.
//! It builds the sink (provisioning the index template on the way), builds the source,
//! starts both workers, waits for a reason to stop, then closes the input queue and
//! waits, with infinite patience, for the SinkWorker to drain.
//!
//! ⚠️ Workers stay private. Like Fight Club, but for async tasks.

pub(crate) mod workers;

use std::future::Future;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::{AppConfig, SinkConfig, SourceConfig};
use crate::backends::elasticsearch::ElasticsearchSink;
use crate::backends::in_mem::{InMemorySink, InMemorySource};
use crate::backends::kafka::KafkaSource;
use crate::backends::{SinkBackend, SourceBackend};
use workers::{FlushReport, IngressReport, SinkWorker, SourceWorker, Worker};

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?"
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 Run until SIGINT/SIGTERM (or until the source runs dry), then drain.
    pub(crate) async fn run(&self) -> Result<FlushReport> {
        self.run_until(shutdown_signal()).await
    }

    /// 🧵 Same as `run`, but the caller decides what "time to stop" looks like.
    pub(crate) async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<FlushReport> {
        let batching = self.app_config.batching.batching_config()?;
        let sink = build_sink(&self.app_config.sink_config)
            .await
            .context("💀 Could not stand up the sink. Nothing will ship until it can.")?;
        let source = build_source(&self.app_config.source_config)
            .await
            .context("💀 Could not stand up the source.")?;

        let (sink_worker, enqueuer) = SinkWorker::new(batching, sink);
        let sink_handle = sink_worker.start();
        let mut source_handle = SourceWorker::new(
            source,
            enqueuer.clone(),
            self.app_config.source_config.read_backoff(),
        )
        .start();
        info!("🚀 Loggy is shipping logs. Ctrl+C to stop.");

        tokio::select! {
            _ = shutdown => info!("🛑 Shutdown signal received, draining..."),
            finished = &mut source_handle => log_ingress_exit(finished),
        }

        // -- 🚪 no new records past this point; whatever is in the queue still gets flushed
        enqueuer.close();
        source_handle.abort();

        let report = sink_handle
            .await
            .context("💀 The SinkWorker task panicked mid-drain. Buffered records went with it.")??;
        info!(
            "✅ Shutdown complete: {} flushes, {} records delivered, {} dropped in {} failed flushes",
            report.flushes(),
            report.records_delivered,
            report.records_dropped,
            report.failed_flushes
        );
        Ok(report)
    }
}

fn log_ingress_exit(finished: std::result::Result<Result<IngressReport>, tokio::task::JoinError>) {
    match finished {
        Ok(Ok(report)) => info!(
            "🏁 Source finished: {} records enqueued, {} undecodable, {} read failures",
            report.records_enqueued, report.decode_failures, report.read_failures
        ),
        Ok(Err(err)) => warn!("⚠️ SourceWorker stopped with an error: {:#}", err),
        Err(err) => warn!("⚠️ SourceWorker task fell over: {}", err),
    }
}

async fn build_sink(config: &SinkConfig) -> Result<SinkBackend> {
    Ok(match config {
        SinkConfig::Elasticsearch(es) => SinkBackend::Elasticsearch(ElasticsearchSink::new(es.clone()).await?),
        SinkConfig::InMemory(_) => SinkBackend::InMemory(InMemorySink::new().await?),
    })
}

async fn build_source(config: &SourceConfig) -> Result<SourceBackend> {
    Ok(match config {
        SourceConfig::Kafka(kafka) => SourceBackend::Kafka(KafkaSource::new(kafka.clone()).await?),
        SourceConfig::InMemory(in_mem) => SourceBackend::InMemory(InMemorySource::new(in_mem.clone()).await?),
    })
}

/// 🛑 Resolves on Ctrl+C, or SIGTERM where there is such a thing.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Could not listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("⚠️ Could not listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
