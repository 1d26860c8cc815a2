//! # Previously, on Loggy...
//!
//! 🎬 Kafka was not running. Elasticsearch was not running. The laptop fan was.
//! Someone still needed to prove that a batch of three records is, in fact, three records.
//!
//! `in_mem` provides an in-memory [`InMemorySource`] and [`InMemorySink`] for tests and
//! local runs. The source hands out a fixed list of payloads (optionally failing a few
//! reads first, for drama). The sink hoards every batch it receives behind an
//! `Arc<Mutex<...>>` so tests can peek, and can be told to fail on purpose.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also deploy a therapist. 🦆

mod in_mem_sink;
mod in_mem_source;

pub(crate) use in_mem_sink::InMemorySink;
pub use in_mem_sink::InMemorySinkConfig;
pub use in_mem_source::InMemorySourceConfig;
pub(crate) use in_mem_source::InMemorySource;
