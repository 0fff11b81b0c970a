//! 🚀 esup: move an Elasticsearch domain to a new one, then walk it up the version ladder.
//!
//! 🎬 *[narrator voice]* "The old domain had served faithfully on 5.1. Too faithfully."
//!
//! The library does the work; `esup-cli` only parses flags and prints the damage.
//! [`run`] dispatches one [`Operation`]. Cloud steps get the real AWS seams wired
//! into a [`workflow::Workflow`]; standalone reindex and seed only get a cluster client. 🦆

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub mod app_config;
pub mod cloud;
pub mod cluster;
pub mod common;
pub mod mock_data;
pub mod polling;
mod progress;
pub mod reindex;
pub mod snapshots;
pub mod workflow;

use crate::app_config::AppConfig;
use crate::cloud::AwsCloud;
use crate::cluster::{ClusterClient, ClusterTarget};
use crate::common::EngineVersion;
use crate::reindex::ReindexOptions;
use crate::workflow::Workflow;

/// 🎯 One thing to do, picked on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Setup, snapshot + restore, teardown, upgrade.
    Migrate,
    Setup,
    /// Register repositories, snapshot the source, restore into the destination.
    Snapshot,
    Teardown,
    /// Climb the upgrade path, optionally stopping at `to`.
    Upgrade { to: Option<EngineVersion> },
    /// Reindex every index of `target` into suffixed siblings, and back when `swap`.
    Reindex { target: ClusterTarget, swap: bool },
    /// Plant the sample documents in `target`.
    Seed { target: ClusterTarget, typeless: bool },
}

/// 🚀 Run `operation`. AWS is only loaded when the operation actually talks to it.
pub async fn run(app_config: AppConfig, operation: Operation) -> Result<()> {
    info!("🎯 Running {:?}", operation);
    match operation {
        Operation::Reindex { target, swap } => {
            let client = standalone_client(&app_config, &target).await?;
            let report = reindex::reindex_all(&client, &ReindexOptions::from(&app_config.reindex), swap)
                .await
                .context(format!("💀 Reindexing {target:?} failed"))?;
            if !report.is_empty() {
                info!("🔁 Reindex report:\n{}", report.render());
            }
            Ok(())
        }
        Operation::Seed { target, typeless } => {
            let client = standalone_client(&app_config, &target).await?;
            mock_data::seed(&client, typeless)
                .await
                .map(|_| ())
                .context(format!("💀 Seeding {target:?} failed"))
        }
        Operation::Migrate => aws_workflow(app_config).await?.migrate().await,
        Operation::Setup => aws_workflow(app_config).await?.setup().await,
        Operation::Snapshot => aws_workflow(app_config).await?.snapshot_and_restore().await,
        Operation::Teardown => aws_workflow(app_config).await?.teardown().await,
        Operation::Upgrade { to } => aws_workflow(app_config).await?.upgrade(to).await,
    }
}

/// ☁️ The cloud steps: both domain names, the AWS clients, and a signer when SigV4 is on.
async fn aws_workflow(app_config: AppConfig) -> Result<Workflow> {
    app_config.require_domains()?;
    let aws = AwsCloud::connect(&app_config.aws).await;
    let signer = if app_config.cluster.sigv4 {
        Some(aws.signer()?)
    } else {
        None
    };
    Ok(Workflow::new(
        app_config.clone(),
        Arc::new(aws.buckets(&app_config.snapshot.bucket_region)),
        Arc::new(aws.access_control()),
        Arc::new(aws.domains()),
        signer,
    ))
}

/// 🔌 A client for a standalone command. A plain URL without SigV4 never touches AWS.
async fn standalone_client(app_config: &AppConfig, target: &ClusterTarget) -> Result<ClusterClient> {
    let config = &app_config.cluster;
    match target {
        ClusterTarget::Url(url) if !config.sigv4 => {
            ClusterClient::new(url.clone(), cluster::auth_for(config, None)?, config)
        }
        _ => {
            let aws = AwsCloud::connect(&app_config.aws).await;
            let signer = if config.sigv4 { Some(aws.signer()?) } else { None };
            cluster::connect(target, &aws.domains(), signer.as_ref(), config).await
        }
    }
}
