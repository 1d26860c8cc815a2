//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN, INT. SERVER ROOM, 3:47 AM
//!
//! The dashboard glows amber. Somewhere a daily index called `loggy-logs-2024.01.01`
//! is about to receive its guests. Half of them belong to `2024.01.02`. They all
//! arrived in the same batch. Nobody told the bulk API. That's our job.
//!
//! 🚀 This module splits each batch by destination index, turns every group into one
//! NDJSON `_bulk` request, and makes sure the index template exists before the first
//! write. It does not retry. It does not buffer. It flushes what it's given and moves on.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

mod elasticsearch_sink;
mod index_template;

pub(crate) use elasticsearch_sink::ElasticsearchSink;
pub use elasticsearch_sink::ElasticsearchSinkConfig;
#[cfg(test)]
pub(crate) use elasticsearch_sink::tests;

/// 🔒 Auth priority: API key wins over basic auth. This is not a democracy.
pub(crate) fn authorize(
    request: reqwest::RequestBuilder,
    config: &ElasticsearchSinkConfig,
) -> reqwest::RequestBuilder {
    if let Some(ref api_key) = config.api_key {
        request.header("Authorization", format!("ApiKey {}", api_key))
    } else if let Some(ref username) = config.username {
        request.basic_auth(username, config.password.as_ref())
    } else {
        request
    }
}
