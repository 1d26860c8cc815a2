use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::FixedOffset;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use super::authorize;
use super::index_template::ensure_index_template;
use crate::backends::Sink;
use crate::common::{IndexNaming, LogRecord, partition_by_destination};

// 🔧 auth is tri-modal: username+password, api_key, or "I hope anonymous works" (locally, it does).
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchSinkConfig {
    /// 📡 Where to send the documents. Scheme + host + port. Yes, all of it.
    pub url: String,
    /// 🔒 Username. The bouncer at the club. Except the club is a database.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key, the velvet rope variant of authentication.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 📦 Daily indices are named `<index_prefix>-<YYYY.MM.DD>`.
    #[serde(default = "default_index_prefix", alias = "index")]
    pub index_prefix: String,
    #[serde(default = "default_template_name")]
    pub template_name: String,
    /// 🌏 Which timezone decides "what day is it". Minutes east of UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏱️ Also the only thing standing between a wedged cluster and a shutdown that never ends.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_index_prefix() -> String {
    "loggy-logs".to_string()
}

fn default_template_name() -> String {
    "loggy-template".to_string()
}

// -- 🔌 10 seconds to handshake. if ES can't say hi by then, it's not having a good time.
fn default_connect_timeout_secs() -> u64 {
    10
}

// -- 📦 30 seconds for a bulk request. meaty payloads, but we're not monsters.
fn default_request_timeout_secs() -> u64 {
    30
}

impl ElasticsearchSinkConfig {
    /// 🏷️ Build the index naming rule from the prefix and offset knobs.
    pub(crate) fn index_naming(&self) -> Result<IndexNaming> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).context(format!(
            "💀 utc_offset_minutes = {} is not a timezone on this planet. Keep it within ±24h.",
            self.utc_offset_minutes
        ))?;
        Ok(IndexNaming::new(self.index_prefix.clone(), offset))
    }
}

/// 📡 The sink side of the Elasticsearch backend, routing plus HTTP, zero buffering.
///
/// `send` splits a batch into per-index groups and fires one `_bulk` POST per group.
/// A group that fails does not take its siblings down with it; the failures are
/// collected and reported once, as a single aggregate error.
///
/// Internally holds:
/// - `client`: the HTTP muscle 💪, reused across requests
/// - `sink_config`: auth, URL, naming knobs
/// - `naming`: the timestamp → index rule
#[derive(Debug)]
pub(crate) struct ElasticsearchSink {
    client: reqwest::Client,
    sink_config: ElasticsearchSinkConfig,
    naming: IndexNaming,
}

/// 📬 Just enough of the `_bulk` response to know whether someone is lying about the 200.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl ElasticsearchSink {
    /// 🚀 Stand up a new `ElasticsearchSink`, fully wired and ready to receive batches.
    ///
    /// 1. Builds the `reqwest::Client` with the configured timeouts.
    /// 2. Pings the cluster root URL. A handshake. A "are you even there?"
    /// 3. PUTs the index template. Once. Here. Not per batch.
    ///
    /// Any failure here is a startup failure, and the process exits non-zero.
    pub(crate) async fn new(config: ElasticsearchSinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. The architect shrugged.")?;

        let naming = config.index_naming()?;

        // -- 📡 Connectivity ping, "Hello? Is this thing on?"
        authorize(client.get(&config.url), &config)
            .send()
            .await
            .context(format!(
                "💀 Reached out to Elasticsearch at '{}' and got ghosted. Check the URL, check the cluster, check your feelings.",
                config.url
            ))?;

        ensure_index_template(&client, &config, &naming)
            .await
            .context("💀 Index template provisioning failed. We refuse to write into a schema-less void.")?;

        Ok(Self {
            client,
            sink_config: config,
            naming,
        })
    }

    /// 📝 Render one destination group as NDJSON. Two lines per record, trailing newline included.
    fn render_bulk(index_name: &str, records: &[LogRecord]) -> Result<String> {
        let mut bulk_body = String::with_capacity(records.len() * 256);
        for record in records {
            let mut action = json!({ "index": { "_index": index_name } });
            if let Some(ref id) = record.id {
                action["index"]["_id"] = json!(id);
            }
            bulk_body.push_str(&action.to_string());
            bulk_body.push('\n');
            bulk_body.push_str(
                &serde_json::to_string(record)
                    .context("💀 A log record refused to serialize. It decoded fine an hour ago. Suspicious.")?,
            );
            bulk_body.push('\n');
        }
        Ok(bulk_body)
    }

    /// 📡 Fires a `_bulk` POST request with the given NDJSON body.
    ///
    /// Non-2xx is a failure. A 2xx whose body says `"errors": true` is ALSO a failure,
    /// because Elasticsearch will cheerfully return 200 while rejecting every document.
    async fn submit_bulk_request(&self, request_body: String) -> Result<()> {
        let bulk_url = format!("{}/_bulk", self.sink_config.url.trim_end_matches('/'));
        let request = self
            .client
            .post(&bulk_url)
            // ⚠️ application/x-ndjson, not application/json. ES has opinions.
            .header("Content-Type", "application/x-ndjson");

        let response = authorize(request, &self.sink_config)
            .body(request_body)
            .send()
            .await
            .context("💀 The bulk request never made it to Elasticsearch. The network responded with what can only be described as 'not vibing with it.'")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("💀 Elasticsearch started answering the bulk request and then trailed off mid-sentence.");
        judge_bulk_response(status, body)
    }
}

/// ⚖️ Decide whether a `_bulk` reply means the documents actually landed.
///
/// A 2xx counts only when its body was read in full. A body that says `"errors": true`
/// is a failure whatever the status.
fn judge_bulk_response(status: reqwest::StatusCode, body: Result<String>) -> Result<()> {
    if !status.is_success() {
        let body = body.unwrap_or_else(|err| format!("<unreadable: {:#}>", err));
        anyhow::bail!(
            "💀 The bulk request arrived, but Elasticsearch said '{}'. The body of the response read: '{}'.",
            status,
            body
        );
    }
    let body = body.context(format!(
        "💀 Elasticsearch said '{}' but we never got the whole answer. Not counting that as delivered.",
        status
    ))?;

    match serde_json::from_str::<BulkResponse>(&body) {
        Ok(parsed) if parsed.errors => {
            let first_error = parsed
                .items
                .iter()
                .filter_map(|item| item.as_object().and_then(|o| o.values().next()))
                .find_map(|action| action.get("error"))
                .map(Value::to_string)
                .unwrap_or_else(|| "no error detail".to_string());
            anyhow::bail!(
                "💀 Elasticsearch said 200 but the body said errors=true across {} items. First complaint: {}",
                parsed.items.len(),
                first_error
            );
        }
        Ok(_) => trace!("🚀 Bulk request landed, documents have left the building, Elvis-style"),
        // -- 🤷 2xx with a body that isn't a bulk response. the status code is all we've got. we take it.
        Err(_) => trace!("🚀 Bulk request returned {} with an unfamiliar body, taking the status at its word", status),
    }
    Ok(())
}

#[async_trait]
impl Sink for ElasticsearchSink {
    /// 🔪 Split by destination index, one `_bulk` per group, failures aggregated at the end.
    async fn send(&mut self, batch: Vec<LogRecord>) -> Result<()> {
        let groups = partition_by_destination(batch, &self.naming);
        let total_groups = groups.len();
        let mut failed_indices = Vec::new();

        for (index_name, records) in groups {
            let outcome = match Self::render_bulk(&index_name, &records) {
                Ok(body) => self.submit_bulk_request(body).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => debug!("✅ {} records landed in '{}'", records.len(), index_name),
                Err(err) => {
                    warn!(
                        "⚠️ {} records for '{}' did not make it: {:#}",
                        records.len(),
                        index_name,
                        err
                    );
                    failed_indices.push(index_name);
                }
            }
        }

        if !failed_indices.is_empty() {
            anyhow::bail!(
                "💀 {} of {} destination groups failed: [{}]",
                failed_indices.len(),
                total_groups,
                failed_indices.join(", ")
            );
        }
        Ok(())
    }

    /// 🗑️ Nothing to flush, we don't buffer. The HTTP client drops cleanly. 🦆
    async fn close(&mut self) -> Result<()> {
        debug!("🗑️ Elasticsearch sink closing, no buffer to flush, just vibes to release");
        Ok(())
    }
}
