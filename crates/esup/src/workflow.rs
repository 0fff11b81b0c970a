//! 🎼 Workflow: the migration, start to finish, one awkward wait at a time.
//!
//! 🎬 PREVIOUSLY ON ESUP: an old domain on 5.1, a shiny empty one on the way, and a
//! bucket that will exist for exactly one afternoon.
//!
//! ```text
//!   setup ──▶ snapshot_and_restore ──▶ teardown ──▶ upgrade
//!   bucket     register repo (src+dst)   bucket       per hop:
//!   domain     snapshot on src           detach         [reindex + swap if major]
//!   policy     restore on dst            policy         check ─▶ upgrade ─▶ ready
//!   role                                 role
//!   attach
//! ```
//!
//! 🧠 Knowledge graph:
//! - The cloud is three seams ([`BucketStore`], [`AccessControl`], [`DomainService`]),
//!   handed in as trait objects. Prod gets AWS; tests get the in-memory cast.
//! - Every step is safe to re-run. Existing things are skipped with a warning,
//!   missing things are skipped on the way out, and hops at or below the domain's
//!   current version are skipped on the way up.
//! - Every wait goes through [`Poller`]. Nothing here sleeps by hand except the
//!   poller's settle delay. 🦆

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::cloud::{
    self, AccessControl, BucketStore, DomainService, DomainSpec, DomainStatus, UpgradeOutcome, UpgradeStage,
};
use crate::cluster::{self, ClusterClient, ClusterTarget, SigV4Signer};
use crate::common::{EngineVersion, Provision, Removal};
use crate::polling::{PollState, Poller};
use crate::progress::render_table;
use crate::reindex::{self, ReindexOptions};
use crate::snapshots::{self, RepositorySettings};

const POLICY_DESCRIPTION: &str = "Policy to allow ES access to S3 bucket.";
const ROLE_DESCRIPTION: &str = "Role that allows ES to read and write snapshots in S3.";

// ===== Upgrade plan =====

/// 🪜 One step up the version staircase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub from: EngineVersion,
    pub to: EngineVersion,
    /// 🔁 Crossing a major line: every index is reindexed and swapped before the upgrade.
    pub reindex_first: bool,
}

/// 🗺️ Which hops will run, and which were already done.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePlan {
    pub current: EngineVersion,
    pub hops: Vec<Hop>,
    pub skipped: Vec<EngineVersion>,
}

impl UpgradePlan {
    /// 🧮 Turn a configured path into hops starting from `current`.
    ///
    /// The path must be strictly increasing. `stop_at` cuts the path off at that
    /// version, which has to be on the path.
    pub fn build(current: EngineVersion, path: &[EngineVersion], stop_at: Option<EngineVersion>) -> Result<Self> {
        if let Some(pair) = path.windows(2).find(|pair| pair[0] >= pair[1]) {
            anyhow::bail!(
                "💀 The upgrade path must climb: {} is followed by {}. Fix upgrade.path.",
                pair[0],
                pair[1]
            );
        }

        let path: Vec<EngineVersion> = match stop_at {
            Some(target) => {
                if !path.contains(&target) {
                    anyhow::bail!(
                        "💀 {} isn't on the upgrade path ({}). Managed upgrades only go one supported hop at a time.",
                        target,
                        path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" → ")
                    );
                }
                path.iter().copied().filter(|version| *version <= target).collect()
            }
            None => path.to_vec(),
        };

        let (skipped, pending): (Vec<EngineVersion>, Vec<EngineVersion>) =
            path.into_iter().partition(|version| *version <= current);

        let mut from = current;
        let hops = pending
            .into_iter()
            .map(|to| {
                let hop = Hop {
                    from,
                    to,
                    reindex_first: from.crosses_major(&to),
                };
                from = to;
                hop
            })
            .collect();

        Ok(Self { current, hops, skipped })
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn render(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .hops
            .iter()
            .enumerate()
            .map(|(n, hop)| {
                vec![
                    (n + 1).to_string(),
                    hop.from.to_string(),
                    hop.to.to_string(),
                    if hop.reindex_first { "reindex + swap" } else { "-" }.to_string(),
                ]
            })
            .collect();
        render_table(&["hop", "from", "to", "before upgrading"], &rows)
    }
}

// ===== Workflow =====

/// 🎼 The conductor. Owns the config and the cloud seams, and runs the steps in order.
#[derive(Debug, Clone)]
pub struct Workflow {
    config: AppConfig,
    buckets: Arc<dyn BucketStore>,
    access: Arc<dyn AccessControl>,
    domains: Arc<dyn DomainService>,
    signer: Option<SigV4Signer>,
}

impl Workflow {
    pub fn new(
        config: AppConfig,
        buckets: Arc<dyn BucketStore>,
        access: Arc<dyn AccessControl>,
        domains: Arc<dyn DomainService>,
        signer: Option<SigV4Signer>,
    ) -> Self {
        Self {
            config,
            buckets,
            access,
            domains,
            signer,
        }
    }

    /// 🚀 Everything: setup, snapshot + restore, teardown, then the upgrade staircase.
    pub async fn migrate(&self) -> Result<()> {
        info!(
            "🚀 Migrating {} → {} ({} → {})",
            self.config.source_domain,
            self.config.destination.name,
            self.config.destination.engine_version,
            self.config
                .upgrade
                .path
                .last()
                .map(ToString::to_string)
                .unwrap_or_else(|| "no upgrades".to_string())
        );
        self.setup().await.context("💀 Setup failed")?;
        self.snapshot_and_restore()
            .await
            .context("💀 Snapshot and restore failed")?;
        self.teardown().await.context("💀 Teardown failed")?;
        self.upgrade(None).await.context("💀 Upgrade failed")?;
        info!("🎉 Migration of {} complete", self.config.destination.name);
        Ok(())
    }

    /// 🏗️ Bucket, destination domain, IAM policy, IAM role, attachment.
    pub async fn setup(&self) -> Result<()> {
        let snapshot = &self.config.snapshot;
        info!("🏗️ Setup: bucket, domain, policy, role");

        report_provision(
            "Bucket",
            &snapshot.bucket,
            self.buckets
                .ensure_bucket(&snapshot.bucket, &snapshot.bucket_region)
                .await?,
        );

        self.ensure_destination_domain().await?;

        let account_id = self.access.account_id().await?;
        let policy_arn = cloud::policy_arn(&account_id, &snapshot.policy_name);
        report_provision(
            "Policy",
            &snapshot.policy_name,
            self.access
                .ensure_policy(
                    &snapshot.policy_name,
                    &cloud::snapshot_policy_document(&snapshot.bucket),
                    POLICY_DESCRIPTION,
                )
                .await?,
        );
        report_provision(
            "Role",
            &snapshot.role_name,
            self.access
                .ensure_role(&snapshot.role_name, &cloud::snapshot_role_trust_document(), ROLE_DESCRIPTION)
                .await?,
        );
        self.access
            .attach_policy(&snapshot.role_name, &policy_arn)
            .await?;
        info!("🔗 Policy {} attached to {}", snapshot.policy_name, snapshot.role_name);
        Ok(())
    }

    /// 🏢 Create the destination domain unless it already exists, then wait until it's usable.
    pub async fn ensure_destination_domain(&self) -> Result<DomainStatus> {
        let destination = &self.config.destination;
        if self.domains.describe(&destination.name).await?.is_some() {
            warn!("🏢 ES domain {} already exists, skipping this step", destination.name);
        } else {
            let spec = DomainSpec {
                name: destination.name.clone(),
                engine_version: destination.engine_version,
                instance_type: destination.instance_type.clone(),
                instance_count: destination.instance_count,
                dedicated_master_enabled: destination.dedicated_master_enabled,
                ebs_volume_type: destination.ebs_volume_type.clone(),
                ebs_volume_size_gb: destination.ebs_volume_size_gb,
                access_policy: destination
                    .access_policy
                    .clone()
                    .unwrap_or_else(|| cloud::OPEN_ACCESS_POLICY.to_string()),
            };
            if destination.access_policy.is_none() {
                warn!("🔓 No destination.access_policy set, the new domain gets the open policy. Lock it down afterwards.");
            }
            self.domains.create(&spec).await?;
            info!("🏗️ ES domain {} created", destination.name);
        }
        self.wait_for_domain_ready(&destination.name).await
    }

    /// ⏳ Poll `describe` until the domain stops processing and has an endpoint.
    pub async fn wait_for_domain_ready(&self, name: &str) -> Result<DomainStatus> {
        let poller = Poller::from_config(format!("domain {name}"), &self.config.polling);
        let domains = self.domains.as_ref();
        poller.until(|_| domain_ready(domains, name)).await
    }

    /// 📸 Register the repository on both domains, snapshot the source, restore into the destination.
    pub async fn snapshot_and_restore(&self) -> Result<()> {
        let snapshot = &self.config.snapshot;
        let account_id = self.access.account_id().await?;
        let settings = RepositorySettings {
            repository: snapshot.repository.clone(),
            bucket: snapshot.bucket.clone(),
            region: snapshot.bucket_region.clone(),
            role_arn: cloud::role_arn(&account_id, &snapshot.role_name),
        };

        let source = self.cluster_for(&self.config.source_domain).await?;
        let destination = self.cluster_for(&self.config.destination.name).await?;

        let register_poller = Poller::from_config("register snapshot repository", &self.config.polling);
        snapshots::register_repository(&source, &settings, &register_poller).await?;
        snapshots::register_repository(&destination, &settings, &register_poller).await?;

        let snapshot_poller = Poller::from_config(format!("snapshot {}", snapshot.snapshot_name), &self.config.polling);
        snapshots::take_snapshot(&source, &snapshot.repository, &snapshot.snapshot_name, &snapshot_poller).await?;

        let restore_poller = Poller::from_config(format!("restore {}", snapshot.snapshot_name), &self.config.polling);
        snapshots::restore_snapshot(
            &destination,
            &snapshot.repository,
            &snapshot.snapshot_name,
            snapshot.restore_indices.as_deref(),
            &restore_poller,
        )
        .await?;
        Ok(())
    }

    /// 🧹 Bucket, attachment, policy, role. Whatever is already gone stays gone.
    pub async fn teardown(&self) -> Result<()> {
        let snapshot = &self.config.snapshot;
        info!("🧹 Teardown: bucket, attachment, policy, role");

        report_removal("Bucket", &snapshot.bucket, self.buckets.remove_bucket(&snapshot.bucket).await?);

        let account_id = self.access.account_id().await?;
        let policy_arn = cloud::policy_arn(&account_id, &snapshot.policy_name);
        report_removal(
            "Attachment",
            &snapshot.role_name,
            self.access.detach_policy(&snapshot.role_name, &policy_arn).await?,
        );
        report_removal("Policy", &snapshot.policy_name, self.access.remove_policy(&policy_arn).await?);
        report_removal("Role", &snapshot.role_name, self.access.remove_role(&snapshot.role_name).await?);
        Ok(())
    }

    /// 🗺️ The hops an upgrade would run right now.
    pub async fn plan_upgrade(&self, stop_at: Option<EngineVersion>) -> Result<UpgradePlan> {
        let name = &self.config.destination.name;
        let status = self
            .domains
            .describe(name)
            .await?
            .context(format!("💀 Domain '{name}' does not exist. Run setup first."))?;
        let current = status
            .engine_version
            .context(format!("💀 Domain '{name}' didn't report an engine version"))?;
        UpgradePlan::build(current, &self.config.upgrade.path, stop_at)
    }

    /// 🪜 Climb the upgrade path, reindexing before every major boundary.
    pub async fn upgrade(&self, stop_at: Option<EngineVersion>) -> Result<()> {
        let plan = self.plan_upgrade(stop_at).await?;
        if !plan.skipped.is_empty() {
            warn!(
                "🪜 Domain is already on {}, skipping hops: {}",
                plan.current,
                plan.skipped.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
        }
        if plan.is_empty() {
            info!("✅ Nothing to upgrade, {} is already at {}", self.config.destination.name, plan.current);
            return Ok(());
        }
        info!("🗺️ Upgrade plan for {}:\n{}", self.config.destination.name, plan.render());

        for hop in &plan.hops {
            self.upgrade_hop(hop)
                .await
                .context(format!("💀 Hop {} → {} failed", hop.from, hop.to))?;
        }
        Ok(())
    }

    async fn upgrade_hop(&self, hop: &Hop) -> Result<()> {
        let name = &self.config.destination.name;
        let domains = self.domains.as_ref();

        if hop.reindex_first {
            info!("🔁 {} → {} crosses a major version, reindexing first", hop.from, hop.to);
            let client = self.cluster_for(name).await?;
            let report = reindex::reindex_all(&client, &ReindexOptions::from(&self.config.reindex), true).await?;
            if !report.is_empty() {
                info!("🔁 Reindex report:\n{}", report.render());
            }
        }

        info!("🩺 Performing upgrade check for domain {} → {}", name, hop.to);
        self.domains.start_upgrade(name, &hop.to, true).await?;
        let check = Poller::for_upgrades(format!("upgrade check {} → {}", hop.from, hop.to), &self.config.polling)
            .until(|_| upgrade_step(domains, name, UpgradeStage::PreUpgradeCheck))
            .await?;
        if check == UpgradeOutcome::SucceededWithIssues {
            warn!("🩺 Upgrade check for {} passed with issues. Proceeding.", hop.to);
        }

        info!("🚀 Domain upgrade {} → {} started", hop.from, hop.to);
        self.domains.start_upgrade(name, &hop.to, false).await?;
        let upgrade = Poller::for_upgrades(format!("upgrade {} → {}", hop.from, hop.to), &self.config.polling)
            .until(|_| upgrade_step(domains, name, UpgradeStage::Upgrade))
            .await?;
        if upgrade == UpgradeOutcome::SucceededWithIssues {
            warn!("🚀 Upgrade to {} finished with issues. Check the domain's upgrade history.", hop.to);
        }

        let status = self.wait_for_domain_ready(name).await?;
        match status.engine_version {
            Some(version) if version == hop.to => info!("✅ {} is now on {}", name, version),
            other => warn!(
                "🤷 {} finished upgrading to {} but reports {:?}",
                name, hop.to, other
            ),
        }
        Ok(())
    }

    async fn connect(&self, target: &ClusterTarget) -> Result<ClusterClient> {
        cluster::connect(target, self.domains.as_ref(), self.signer.as_ref(), &self.config.cluster).await
    }

    async fn cluster_for(&self, domain: &str) -> Result<ClusterClient> {
        self.connect(&ClusterTarget::Domain(domain.to_string())).await
    }
}

/// 🔭 One look at a domain: ready, still cooking, or not there yet.
async fn domain_ready(domains: &dyn DomainService, name: &str) -> Result<PollState<DomainStatus>> {
    match domains.describe(name).await? {
        Some(status) if status.is_ready() => Ok(PollState::Done(status)),
        Some(status) if status.processing => Ok(PollState::Pending("processing".to_string())),
        Some(_) => Ok(PollState::Pending("waiting for an endpoint".to_string())),
        None => Ok(PollState::Pending("not visible yet".to_string())),
    }
}

/// 🔭 One look at the upgrade status, judged against the step we're waiting for.
///
/// While waiting on a check, other steps' statuses are pending. A real upgrade runs
/// its own check and snapshot first, so while waiting on `Upgrade` a failure at any
/// step ends the wait.
/// Status read errors are pending too: the endpoint hiccups mid-upgrade.
async fn upgrade_step(
    domains: &dyn DomainService,
    name: &str,
    waiting_for: UpgradeStage,
) -> Result<PollState<UpgradeOutcome>> {
    let progress = match domains.upgrade_status(name).await {
        Ok(progress) => progress,
        Err(err) => return Ok(PollState::Pending(format!("{err:#}"))),
    };

    let failed = progress.outcome == UpgradeOutcome::Failed;
    if failed && (progress.stage == waiting_for || waiting_for == UpgradeStage::Upgrade) {
        anyhow::bail!("💀 {:?} step FAILED on domain {}", progress.stage, name);
    }
    if progress.stage == waiting_for && progress.outcome.is_terminal() {
        return Ok(PollState::Done(progress.outcome));
    }
    Ok(PollState::Pending(format!("{:?} {:?}", progress.stage, progress.outcome)))
}

fn report_provision(kind: &str, name: &str, outcome: Provision) {
    match outcome {
        Provision::Created => info!("✅ {} {} created", kind, name),
        Provision::AlreadyPresent => warn!("♻️ {} {} already exists, skipping this step", kind, name),
    }
}

fn report_removal(kind: &str, name: &str, outcome: Removal) {
    match outcome {
        Removal::Removed => info!("🗑️ {} {} deleted", kind, name),
        Removal::AlreadyAbsent => warn!("♻️ {} {} does not exist, skipping this step", kind, name),
    }
}
