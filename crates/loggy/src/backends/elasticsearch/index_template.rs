//! 🏗️ Index template provisioning, the one-time, idempotent "please have a schema" call.
//!
//! Every daily index matching `<prefix>-*` gets the same mappings. We PUT the template
//! once at startup; ES happily overwrites it with the same content on every restart.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;

use super::{ElasticsearchSinkConfig, authorize};
use crate::common::IndexNaming;

/// 📐 The template body. `requestId` and `level` are keywords so you can filter on them
/// at 3am without a full-text search accidentally matching "error_handler_ok".
pub(crate) fn index_template_body(naming: &IndexNaming) -> Value {
    json!({
        "index_patterns": [naming.index_pattern()],
        "template": {
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "requestId": { "type": "keyword" },
                    "level": { "type": "keyword" },
                    "message": { "type": "text" },
                    "timestamp": { "type": "date" },
                    "metadata": { "type": "object", "enabled": true }
                }
            }
        }
    })
}

/// 🚀 PUT `_index_template/<name>`. Anything but a 2xx is fatal, no schema, no shipping.
pub(crate) async fn ensure_index_template(
    client: &reqwest::Client,
    config: &ElasticsearchSinkConfig,
    naming: &IndexNaming,
) -> Result<()> {
    let template_url = format!(
        "{}/_index_template/{}",
        config.url.trim_end_matches('/'),
        config.template_name
    );
    let body = serde_json::to_string(&index_template_body(naming))
        .context("💀 The index template refused to become JSON. It was JSON five lines ago.")?;

    let response = authorize(client.put(&template_url), config)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .context(format!(
            "💀 Could not reach '{}' to provision the index template. The cluster is ghosting us at startup, which is honestly the best time to find out.",
            template_url
        ))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "💀 Elasticsearch rejected index template '{}' with '{}'. The response body read: '{}'. No schema, no shipping.",
            config.template_name,
            status,
            body
        );
    }

    info!(
        "🏗️ Index template '{}' is in place for pattern '{}'",
        config.template_name,
        naming.index_pattern()
    );
    Ok(())
}
