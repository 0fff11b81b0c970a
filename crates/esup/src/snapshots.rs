//! 📸 Snapshots: register the repository, take the picture, develop it somewhere else.
//!
//! 🎬 The old domain smiles for the camera. Its shards are copied into a bucket.
//! The new domain, freshly born, is handed the photo album and told "this is you now."
//!
//! 🧠 Knowledge graph:
//! - [`register_repository`] is retried until HTTP 200. Right after the IAM role is
//!   created the domain can't assume it yet, so 4xx/5xx here usually means "wait".
//! - [`take_snapshot`] / [`restore_snapshot`] kick things off and then hand over to
//!   [`wait_for_snapshot`], which polls `_status` until `SUCCESS`.
//! - `_status` describes the stored snapshot, not the restore. So a restore also waits
//!   in [`wait_for_recovery`] until `_recovery?active_only=true` has no shards left.
//! - `FAILED` and `ABORTED` end the wait with an error instead of spinning forever. 🦆

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::polling::{PollState, Poller};

/// 🪣 Where a repository keeps its snapshots and which role it writes with.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositorySettings {
    pub repository: String,
    pub bucket: String,
    pub region: String,
    pub role_arn: String,
}

impl RepositorySettings {
    fn body(&self) -> serde_json::Value {
        json!({
            "type": "s3",
            "settings": {
                "bucket": self.bucket,
                "region": self.region,
                "role_arn": self.role_arn,
            }
        })
    }
}

/// ✅ The final word from `_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub state: String,
    pub stats: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    snapshots: Vec<SnapshotStatus>,
}

#[derive(Debug, Deserialize)]
struct SnapshotStatus {
    state: String,
    #[serde(default)]
    stats: serde_json::Value,
}

fn snapshot_path(repository: &str, snapshot: &str) -> String {
    format!("/_snapshot/{repository}/{snapshot}")
}

/// 📝 `PUT /_snapshot/{repo}` until the cluster says 200.
pub async fn register_repository(client: &ClusterClient, settings: &RepositorySettings, poller: &Poller) -> Result<()> {
    let path = format!("/_snapshot/{}", settings.repository);
    let body = settings.body();
    info!(
        "📝 Registering snapshot repository '{}' on {} (bucket {}, role {})",
        settings.repository,
        client.base_url(),
        settings.bucket,
        settings.role_arn
    );

    poller.until(|_| try_register(client, &path, &body)).await?;

    info!("✅ Repository '{}' registered on {}", settings.repository, client.base_url());
    Ok(())
}

async fn try_register(client: &ClusterClient, path: &str, body: &serde_json::Value) -> Result<PollState<()>> {
    match client.put_json(path, body).await {
        Ok(response) if response.status == 200 => Ok(PollState::Done(())),
        Ok(response) => {
            debug!("📝 repository registration answered HTTP {}: {}", response.status, response.body);
            Ok(PollState::Pending(format!("HTTP {}", response.status)))
        }
        Err(err) => Ok(PollState::Pending(format!("{err:#}"))),
    }
}

/// 📸 `PUT /_snapshot/{repo}/{name}`, then wait for `SUCCESS`.
///
/// A snapshot with the same name already in the repository is treated as a previous
/// run's work: we skip straight to waiting on it.
pub async fn take_snapshot(
    client: &ClusterClient,
    repository: &str,
    snapshot: &str,
    poller: &Poller,
) -> Result<SnapshotSummary> {
    info!("📸 Taking snapshot '{}' into repository '{}' on {}", snapshot, repository, client.base_url());
    let response = client.put_json(&snapshot_path(repository, snapshot), &json!({})).await?;

    if response.status == 200 {
        info!("📸 Snapshot '{}' started", snapshot);
    } else if already_exists(&response.body) {
        warn!("📸 Snapshot '{}' already exists in '{}', skipping this step and waiting on it", snapshot, repository);
    } else {
        response.ensure_success(&format!("Starting snapshot '{snapshot}'"))?;
    }

    wait_for_snapshot(client, repository, snapshot, poller).await
}

fn already_exists(body: &str) -> bool {
    body.contains("invalid_snapshot_name_exception") && body.contains("already exists")
}

/// ♻️ `POST /_snapshot/{repo}/{name}/_restore`, then wait for `SUCCESS`.
pub async fn restore_snapshot(
    client: &ClusterClient,
    repository: &str,
    snapshot: &str,
    indices: Option<&str>,
    poller: &Poller,
) -> Result<SnapshotSummary> {
    let path = format!("{}/_restore", snapshot_path(repository, snapshot));
    info!("♻️ Restoring snapshot '{}' from '{}' into {}", snapshot, repository, client.base_url());

    let response = match indices {
        Some(pattern) => client.post_json(&path, &json!({ "indices": pattern })).await?,
        None => client.post_empty(&path).await?,
    };
    response.ensure_success(&format!("Restoring snapshot '{snapshot}'"))?;
    info!("♻️ Snapshot '{}' restoring...", snapshot);

    let summary = wait_for_snapshot(client, repository, snapshot, poller).await?;
    wait_for_recovery(client, poller).await?;
    Ok(summary)
}

/// 🩹 Poll `GET /_recovery?active_only=true` until no index reports a recovering shard.
pub async fn wait_for_recovery(client: &ClusterClient, poller: &Poller) -> Result<()> {
    poller.until(|_| recovery_state(client)).await?;
    info!("✅ Every restored shard on {} has recovered", client.base_url());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct IndexRecovery {
    #[serde(default)]
    shards: Vec<serde_json::Value>,
}

/// 🔭 One look at `_recovery`.
async fn recovery_state(client: &ClusterClient) -> Result<PollState<()>> {
    let response = match client.get("/_recovery?active_only=true").await {
        Ok(response) => response,
        Err(err) => return Ok(PollState::Pending(format!("{err:#}"))),
    };
    if response.status == 500 {
        return Ok(PollState::Pending("HTTP 500".to_string()));
    }
    let recoveries: BTreeMap<String, IndexRecovery> = response.ensure_success("Reading shard recovery")?.json()?;
    let active: Vec<String> = recoveries
        .into_iter()
        .filter(|(_, recovery)| !recovery.shards.is_empty())
        .map(|(index, recovery)| format!("{index} ({} shards)", recovery.shards.len()))
        .collect();
    if active.is_empty() {
        Ok(PollState::Done(()))
    } else {
        Ok(PollState::Pending(format!("recovering {}", active.join(", "))))
    }
}

/// ⏳ Poll `GET /_snapshot/{repo}/{name}/_status` until the first snapshot reports `SUCCESS`.
pub async fn wait_for_snapshot(
    client: &ClusterClient,
    repository: &str,
    snapshot: &str,
    poller: &Poller,
) -> Result<SnapshotSummary> {
    let path = format!("{}/_status", snapshot_path(repository, snapshot));

    let summary = poller.until(|_| snapshot_state(client, &path, snapshot)).await?;

    info!("✅ Snapshot '{}': {} {}", snapshot, summary.state, summary.stats);
    Ok(summary)
}

/// 🔭 One look at `_status`.
async fn snapshot_state(client: &ClusterClient, path: &str, snapshot: &str) -> Result<PollState<SnapshotSummary>> {
    let response = match client.get(path).await {
        Ok(response) => response,
        Err(err) => return Ok(PollState::Pending(format!("{err:#}"))),
    };
    // -- 🔥 a busy cluster answers _status with 500 now and then; it's not the end
    if response.status == 500 {
        return Ok(PollState::Pending("HTTP 500".to_string()));
    }
    let status: StatusResponse = response
        .ensure_success(&format!("Reading status of snapshot '{snapshot}'"))?
        .json()?;
    let Some(first) = status.snapshots.into_iter().next() else {
        return Ok(PollState::Pending("no snapshot reported yet".to_string()));
    };
    if first.state == "SUCCESS" {
        return Ok(PollState::Done(SnapshotSummary {
            state: first.state,
            stats: first.stats,
        }));
    }
    if matches!(first.state.as_str(), "FAILED" | "ABORTED") {
        anyhow::bail!("💀 Snapshot '{}' ended in state {}", snapshot, first.state);
    }
    Ok(PollState::Pending(first.state))
}
