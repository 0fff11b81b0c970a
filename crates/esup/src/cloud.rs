//! ☁️ Cloud: the supporting cast of the migration.
//!
//! 🪣 A bucket to hold the snapshot, an IAM role and policy so the domain may write
//! into that bucket, and the managed domain service itself. None of them are the
//! star of the show. All of them can ruin it.
//!
//! 🎭 This module is the casting agency. Each concern is a trait; the real AWS
//! implementations live next door, and the test doubles live in `in_mem`. The
//! workflow never knows which one it got. Ignorance is a feature. It's called
//! "abstraction." 🦆
//!
//! ⚠️ Every `ensure_*` and `remove_*` here is idempotent. Run it twice, get the
//! same cloud. That's the whole contract, and it's why re-running a half-finished
//! migration is boring instead of terrifying.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{EngineVersion, Provision, Removal};

mod aws;
mod es_domain;
mod iam;
#[cfg(test)]
pub(crate) mod in_mem;
mod s3_bucket;

pub use aws::AwsCloud;
pub use es_domain::AwsDomainService;
pub use iam::AwsAccessControl;
pub use s3_bucket::AwsBucketStore;

// ===== Bucket =====

/// 🪣 Where snapshots go to sleep between domains.
#[async_trait]
pub trait BucketStore: Send + Sync + std::fmt::Debug {
    /// 🏗️ Make sure the bucket exists in `region`. Already ours? Fine. Skip.
    async fn ensure_bucket(&self, bucket: &str, region: &str) -> Result<Provision>;
    /// 🗑️ Empty the bucket, then delete it. Not there? Also fine.
    async fn remove_bucket(&self, bucket: &str) -> Result<Removal>;
}

// ===== IAM =====

/// 🔒 The IAM role + policy pair that lets a domain read and write the snapshot bucket.
#[async_trait]
pub trait AccessControl: Send + Sync + std::fmt::Debug {
    /// 🪪 The account we're signed into. Needed to spell out ARNs.
    async fn account_id(&self) -> Result<String>;
    async fn ensure_policy(&self, name: &str, document: &str, description: &str) -> Result<Provision>;
    async fn remove_policy(&self, policy_arn: &str) -> Result<Removal>;
    async fn ensure_role(&self, name: &str, trust_document: &str, description: &str) -> Result<Provision>;
    async fn remove_role(&self, name: &str) -> Result<Removal>;
    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<Provision>;
    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<Removal>;
}

// ===== Domains =====

/// 📋 Everything we need to stand up a new domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSpec {
    pub name: String,
    pub engine_version: EngineVersion,
    pub instance_type: String,
    pub instance_count: i32,
    pub dedicated_master_enabled: bool,
    pub ebs_volume_type: String,
    pub ebs_volume_size_gb: i32,
    pub access_policy: String,
}

/// 🔭 A domain as the service describes it, trimmed to what the workflow reads.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStatus {
    pub name: String,
    pub arn: String,
    /// 🔄 True while the service is still applying a change (create, upgrade, config).
    pub processing: bool,
    /// 📡 Host only, no scheme. None until the domain is reachable.
    pub endpoint: Option<String>,
    pub engine_version: Option<EngineVersion>,
}

impl DomainStatus {
    /// ✅ Ready means "not processing" AND "has somewhere to send requests".
    pub fn is_ready(&self) -> bool {
        !self.processing && self.endpoint.is_some()
    }
}

/// 🪜 Which phase of an upgrade the status endpoint is talking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStage {
    PreUpgradeCheck,
    Snapshot,
    Upgrade,
    Unknown,
}

/// 🚦 How that phase is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    InProgress,
    Succeeded,
    SucceededWithIssues,
    Failed,
    Unknown,
}

impl UpgradeOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpgradeOutcome::Succeeded | UpgradeOutcome::SucceededWithIssues | UpgradeOutcome::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeProgress {
    pub stage: UpgradeStage,
    pub outcome: UpgradeOutcome,
}

/// 🏢 The managed domain service: create, describe, upgrade, and "how's the upgrade going?"
#[async_trait]
pub trait DomainService: Send + Sync + std::fmt::Debug {
    /// 🔭 `None` means the domain does not exist. Any other failure is an `Err`.
    async fn describe(&self, name: &str) -> Result<Option<DomainStatus>>;
    async fn create(&self, spec: &DomainSpec) -> Result<()>;
    /// 🚀 Kick off an upgrade to `target`. `check_only` runs the eligibility check instead.
    async fn start_upgrade(&self, name: &str, target: &EngineVersion, check_only: bool) -> Result<()>;
    async fn upgrade_status(&self, name: &str) -> Result<UpgradeProgress>;
}

// ===== Policy documents =====

/// 📜 The access policy the old scripts attached to new domains: everyone, everything.
/// Kept as the default for parity. Override `destination.access_policy`. Seriously.
pub const OPEN_ACCESS_POLICY: &str = r#"{"Version": "2012-10-17", "Statement": [{"Action": "es:*", "Principal":"*","Effect": "Allow", "Condition": {"IpAddress":{"aws:SourceIp":["*"]}}}]}"#;

/// 📜 Lets the domain list the bucket and read/write/delete its objects, and pass the role.
pub fn snapshot_policy_document(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Action": ["s3:ListBucket"],
                "Effect": "Allow",
                "Resource": [format!("arn:aws:s3:::{bucket}")]
            },
            {
                "Action": ["s3:GetObject", "s3:PutObject", "s3:DeleteObject", "iam:PassRole"],
                "Effect": "Allow",
                "Resource": [format!("arn:aws:s3:::{bucket}/*")]
            }
        ]
    })
    .to_string()
}

/// 📜 Trust policy: the Elasticsearch service may assume the snapshot role.
pub fn snapshot_role_trust_document() -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "",
                "Effect": "Allow",
                "Principal": { "Service": "es.amazonaws.com" },
                "Action": "sts:AssumeRole"
            }
        ]
    })
    .to_string()
}

pub fn policy_arn(account_id: &str, policy_name: &str) -> String {
    format!("arn:aws:iam::{account_id}:policy/{policy_name}")
}

pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role_name}")
}
