//! 🔁 Reindex: copy every index to a sibling, delete the original, and (optionally) copy back.
//!
//! 🎬 "Indices created in 5.x cannot be read by 7.x." -- the release notes, calmly
//! ruining an afternoon.
//!
//! Before a domain hops a major version, every index gets rewritten under the
//! current version: `movies` → `movies-reindex`, then `movies` is dropped. The swap
//! pass brings them home: `movies-reindex` → `movies`, then the sibling is dropped.
//!
//! 🧠 Knowledge graph:
//! - Index list comes from `GET /_cluster/state/metadata`, processed in descending name order.
//! - Closed indices are opened first (and given a moment to find their shards).
//! - `_reindex` runs with `wait_for_completion=true` on a long leash.
//! - The source is deleted ONLY when the copy didn't time out and reported no failures.
//! - `_reindex` never creates the destination for an empty index. So for zero documents
//!   the destination is created by hand from the source's mappings and shard counts
//!   before the source goes. An empty index left behind would still carry its old
//!   creation version into the next major.
//! - Forward pass skips names already wearing the suffix, so a re-run after a crash
//!   picks up where it left off. The swap pass handles exactly those. 🦆

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::app_config::ReindexConfig;
use crate::cluster::ClusterClient;
use crate::progress::render_table;

/// 🔧 Reindex knobs, in their runtime shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ReindexOptions {
    pub suffix: String,
    pub request_timeout: Duration,
    pub open_settle: Duration,
    pub include_dot_indices: bool,
}

impl From<&ReindexConfig> for ReindexOptions {
    fn from(config: &ReindexConfig) -> Self {
        Self {
            suffix: config.suffix.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            open_settle: Duration::from_millis(config.open_settle_ms),
            include_dot_indices: config.include_dot_indices,
        }
    }
}

/// 📋 One copy, as it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ReindexRow {
    pub source: String,
    pub destination: String,
    pub total: u64,
    pub took_ms: u64,
    /// 🫙 The source was empty, so the destination was created from its mappings.
    pub mappings_only: bool,
}

/// 📋 Every copy of a pass (or two).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReindexReport {
    pub rows: Vec<ReindexRow>,
}

impl ReindexReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn extend(&mut self, other: ReindexReport) {
        self.rows.extend(other.rows);
    }

    /// 🍽️ The report as a table, for humans.
    pub fn render(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                vec![
                    row.source.clone(),
                    row.destination.clone(),
                    row.total.to_string(),
                    format!("{} ms", row.took_ms),
                    if row.mappings_only { "mappings only" } else { "_reindex" }.to_string(),
                ]
            })
            .collect();
        render_table(&["source", "destination", "docs", "took", "copied with"], &rows)
    }
}

#[derive(Debug, Deserialize)]
struct ClusterState {
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    indices: BTreeMap<String, IndexMetadata>,
}

#[derive(Debug, Deserialize)]
struct IndexMetadata {
    state: String,
}

#[derive(Debug, Deserialize)]
struct ReindexResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    timed_out: bool,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    failures: Vec<serde_json::Value>,
}

/// 🗺️ Index name → open? Sorted by name.
pub async fn index_states(client: &ClusterClient) -> Result<BTreeMap<String, bool>> {
    let state: ClusterState = client
        .get("/_cluster/state/metadata")
        .await?
        .ensure_success("Reading cluster state")?
        .json()?;
    Ok(state
        .metadata
        .indices
        .into_iter()
        .map(|(name, meta)| (name, meta.state == "open"))
        .collect())
}

/// ➡️ `name` → `name{suffix}` for every eligible index, newest-sorting first.
pub async fn forward_pass(client: &ClusterClient, options: &ReindexOptions) -> Result<ReindexReport> {
    let states = index_states(client).await?;
    let mut report = ReindexReport::default();

    for (index, open) in states.iter().rev() {
        if index.starts_with('.') && !options.include_dot_indices {
            debug!("🫣 Skipping system index {}", index);
            continue;
        }
        if index.ends_with(&options.suffix) {
            warn!("🔁 {} already carries the '{}' suffix, leaving it for the swap pass", index, options.suffix);
            continue;
        }
        let destination = format!("{index}{}", options.suffix);
        report.rows.push(copy_then_delete(client, index, &destination, *open, options).await?);
    }
    Ok(report)
}

/// ⬅️ `name{suffix}` → `name` for every index wearing the suffix.
pub async fn swap_pass(client: &ClusterClient, options: &ReindexOptions) -> Result<ReindexReport> {
    let states = index_states(client).await?;
    let mut report = ReindexReport::default();

    for (index, open) in states.iter().rev() {
        let Some(destination) = index.strip_suffix(&options.suffix) else {
            continue;
        };
        if destination.is_empty() {
            continue;
        }
        if destination.starts_with('.') && !options.include_dot_indices {
            continue;
        }
        report.rows.push(copy_then_delete(client, index, destination, *open, options).await?);
    }
    Ok(report)
}

/// 🔁 Forward pass, then the swap pass when `swap` is set.
pub async fn reindex_all(client: &ClusterClient, options: &ReindexOptions, swap: bool) -> Result<ReindexReport> {
    info!("🔁 Reindexing every index on {} (swap back: {})", client.base_url(), swap);
    let mut report = forward_pass(client, options).await?;
    if swap {
        report.extend(swap_pass(client, options).await?);
    }
    info!("✅ Reindex finished: {} copies", report.rows.len());
    Ok(report)
}

async fn copy_then_delete(
    client: &ClusterClient,
    source: &str,
    destination: &str,
    open: bool,
    options: &ReindexOptions,
) -> Result<ReindexRow> {
    if !open {
        info!("🔓 Opening closed index {}", source);
        client
            .post_empty(&format!("/{source}/_open"))
            .await?
            .ensure_success(&format!("Opening index '{source}'"))?;
        tokio::time::sleep(options.open_settle).await;
    }

    info!("🔁 Reindexing data in index {} into {}", source, destination);
    let body = json!({
        "source": { "index": source },
        "dest": { "index": destination },
    });
    let result: ReindexResponse = client
        .send(
            Method::POST,
            "/_reindex?wait_for_completion=true",
            Some(body.to_string()),
            Some(options.request_timeout),
        )
        .await
        .context(format!("💀 Reindex {source} → {destination} never came back. The copy may still be running on the cluster."))?
        .ensure_success(&format!("Reindexing '{source}' into '{destination}'"))?
        .json()?;
    debug!(
        "🔁 {} → {}: total={} took={}ms timed_out={} failures={}",
        source,
        destination,
        result.total,
        result.took,
        result.timed_out,
        result.failures.len()
    );

    if result.timed_out || !result.failures.is_empty() {
        anyhow::bail!(
            "💀 Reindex {} → {} did not finish cleanly (timed_out={}, {} failures). '{}' was kept; fix the cause and re-run.",
            source,
            destination,
            result.timed_out,
            result.failures.len(),
            source
        );
    }

    let mappings_only = result.total == 0;
    if mappings_only {
        info!("🫙 {} has no documents, creating {} from its mappings instead", source, destination);
        create_empty_sibling(client, source, destination).await?;
    }

    let timeout_secs = options.request_timeout.as_secs();
    client
        .send(
            Method::DELETE,
            &format!("/{source}?timeout={timeout_secs}s"),
            None,
            Some(options.request_timeout),
        )
        .await?
        .ensure_success(&format!("Deleting index '{source}'"))?;
    info!("🗑️ {} copied ({} docs) and deleted", source, result.total);

    Ok(ReindexRow {
        source: source.to_string(),
        destination: destination.to_string(),
        total: result.total,
        took_ms: result.took,
        mappings_only,
    })
}

/// 🏗️ `PUT /{destination}` with the source's mappings, shard count and replica count.
///
/// Other index settings are left out: uuid, creation date and version are per-index
/// and the cluster refuses them on create. An existing destination (a re-run) is fine.
async fn create_empty_sibling(client: &ClusterClient, source: &str, destination: &str) -> Result<()> {
    let mappings: serde_json::Value = client
        .get(&format!("/{source}/_mapping"))
        .await?
        .ensure_success(&format!("Reading mappings of '{source}'"))?
        .json()?;
    let settings: serde_json::Value = client
        .get(&format!("/{source}/_settings"))
        .await?
        .ensure_success(&format!("Reading settings of '{source}'"))?
        .json()?;

    let index_settings = &settings[source]["settings"]["index"];
    let mut body = json!({ "mappings": mappings[source]["mappings"].clone() });
    if body["mappings"].is_null() {
        body["mappings"] = json!({});
    }
    let mut copied = serde_json::Map::new();
    for key in ["number_of_shards", "number_of_replicas"] {
        if let Some(value) = index_settings.get(key) {
            copied.insert(key.to_string(), value.clone());
        }
    }
    body["settings"] = json!({ "index": copied });

    let response = client.put_json(&format!("/{destination}"), &body).await?;
    if response.body.contains("resource_already_exists_exception") {
        warn!("🏗️ {} already exists, skipping this step", destination);
        return Ok(());
    }
    response.ensure_success(&format!("Creating empty index '{destination}'"))?;
    Ok(())
}
