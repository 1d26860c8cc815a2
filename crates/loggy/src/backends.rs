//! 🔌 Backends, where the real I/O happens.
//!
//! 🚰 Source backends pour raw payloads, Sink backends swallow whole batches.
//! And in between sits the SinkWorker, holding the buffer like a nervous waiter
//! holding a tray of drinks. (We don't panic. We use anyhow.)
//!
//! 🎭 This module is the casting agency. Need to read from Kafka? Write to
//! Elasticsearch? Pretend to do both in RAM for a test? We've got a backend for that.
//!
//! 🦆 The duck is here because every file must have one. This is law.

mod sink;
mod source;

pub(crate) mod elasticsearch;
pub(crate) mod in_mem;
pub(crate) mod kafka;

pub(crate) use sink::{Sink, SinkBackend};
pub(crate) use source::{Source, SourceBackend};

// 🎯 Re-export backend-specific configs so callers can do `backends::KafkaSourceConfig`
// instead of spelunking into `backends::kafka::KafkaSourceConfig`.
pub use elasticsearch::ElasticsearchSinkConfig;
pub use in_mem::{InMemorySinkConfig, InMemorySourceConfig};
pub use kafka::KafkaSourceConfig;
