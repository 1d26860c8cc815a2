//! 🐘 THE KAFKA BACKEND
//!
//! 🎬 *[a topic fills with JSON. a consumer group waits. the offsets do not move themselves.]*
//!
//! The `kafka` crate gives us a blocking consumer. Tokio does not love blocking
//! consumers. So every poll takes a short trip to the blocking pool and comes back
//! with a Vec of raw payloads. Decoding is somebody else's job. 🦆

mod kafka_source;

pub(crate) use kafka_source::KafkaSource;
pub use kafka_source::KafkaSourceConfig;
