//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the
//! credit in the sprint retro.
//!
//! Two of them, for the whole life of the process:
//! - [`SourceWorker`]: polls the queue, decodes, enqueues.
//! - [`SinkWorker`]: buffers, flushes, reports.
//!
//! They talk through one bounded channel and nothing else. 🦆

use anyhow::Result;
use tokio::task::JoinHandle;

pub(crate) mod sink_worker;
pub(crate) mod source_worker;

pub(crate) use sink_worker::{BatchingConfig, Enqueuer, FlushReport, SinkWorker};
pub(crate) use source_worker::{IngressReport, SourceWorker};

/// 🏗️ A background worker, that does work. duh.
///
/// `start` spawns the worker and hands back its JoinHandle. The handle resolving is the
/// worker's one-shot "I'm done" signal, and `Output` is what it has to say about it.
pub(crate) trait Worker {
    type Output: Send + 'static;

    fn start(self) -> JoinHandle<Result<Self::Output>>;
}
