//! # Previously, on esup...
//!
//! 🎬 The cloud was expensive, slow, and refused to run inside `cargo test`.
//! Someone had to pretend to be AWS. Someone had to keep a bucket in a `HashSet`
//! and a domain in a `HashMap` and answer "IN_PROGRESS" with a straight face.
//!
//! That someone was this module.
//!
//! Every fake writes what it was asked to do into a shared [`Journal`], so tests
//! can assert the ORDER of the migration, not just its ending. 🦆
//!
//! ⚠️ This is NOT for production. This is for tests. If you're deploying this
//! to prod, please also deploy a therapist.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::{
    AccessControl, BucketStore, DomainService, DomainSpec, DomainStatus, UpgradeOutcome, UpgradeProgress,
    UpgradeStage,
};
use crate::common::{EngineVersion, Provision, Removal};

/// 📓 The shared diary of everything the fakes were asked to do, in order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn write(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock poisoned").push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock poisoned").clone()
    }

    /// 🔎 Position of the first entry starting with `prefix`, for ordering asserts.
    pub(crate) fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }
}

// ===== Buckets =====

#[derive(Debug, Default)]
pub(crate) struct InMemoryBuckets {
    pub(crate) buckets: Mutex<HashSet<String>>,
    journal: Journal,
}

impl InMemoryBuckets {
    pub(crate) fn new(journal: Journal) -> Self {
        Self { buckets: Mutex::default(), journal }
    }
}

#[async_trait]
impl BucketStore for InMemoryBuckets {
    async fn ensure_bucket(&self, bucket: &str, region: &str) -> Result<Provision> {
        self.journal.write(format!("bucket.ensure {bucket} {region}"));
        let created = self.buckets.lock().expect("lock").insert(bucket.to_string());
        Ok(if created { Provision::Created } else { Provision::AlreadyPresent })
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<Removal> {
        self.journal.write(format!("bucket.remove {bucket}"));
        let removed = self.buckets.lock().expect("lock").remove(bucket);
        Ok(if removed { Removal::Removed } else { Removal::AlreadyAbsent })
    }
}

// ===== IAM =====

#[derive(Debug, Default)]
pub(crate) struct InMemoryAccessControl {
    pub(crate) policies: Mutex<HashMap<String, String>>,
    pub(crate) roles: Mutex<HashSet<String>>,
    pub(crate) attachments: Mutex<HashSet<(String, String)>>,
    journal: Journal,
}

pub(crate) const FAKE_ACCOUNT: &str = "123456789012";

impl InMemoryAccessControl {
    pub(crate) fn new(journal: Journal) -> Self {
        Self { journal, ..Self::default() }
    }
}

#[async_trait]
impl AccessControl for InMemoryAccessControl {
    async fn account_id(&self) -> Result<String> {
        Ok(FAKE_ACCOUNT.to_string())
    }

    async fn ensure_policy(&self, name: &str, document: &str, _description: &str) -> Result<Provision> {
        self.journal.write(format!("policy.ensure {name}"));
        let arn = super::policy_arn(FAKE_ACCOUNT, name);
        let mut policies = self.policies.lock().expect("lock");
        if policies.contains_key(&arn) {
            return Ok(Provision::AlreadyPresent);
        }
        policies.insert(arn, document.to_string());
        Ok(Provision::Created)
    }

    async fn remove_policy(&self, policy_arn: &str) -> Result<Removal> {
        self.journal.write(format!("policy.remove {policy_arn}"));
        if self.attachments.lock().expect("lock").iter().any(|(_, arn)| arn == policy_arn) {
            // -- 🔒 real IAM refuses to delete attached policies; so do we
            anyhow::bail!("DeleteConflict: policy {policy_arn} is still attached");
        }
        let removed = self.policies.lock().expect("lock").remove(policy_arn).is_some();
        Ok(if removed { Removal::Removed } else { Removal::AlreadyAbsent })
    }

    async fn ensure_role(&self, name: &str, _trust_document: &str, _description: &str) -> Result<Provision> {
        self.journal.write(format!("role.ensure {name}"));
        let created = self.roles.lock().expect("lock").insert(name.to_string());
        Ok(if created { Provision::Created } else { Provision::AlreadyPresent })
    }

    async fn remove_role(&self, name: &str) -> Result<Removal> {
        self.journal.write(format!("role.remove {name}"));
        let removed = self.roles.lock().expect("lock").remove(name);
        Ok(if removed { Removal::Removed } else { Removal::AlreadyAbsent })
    }

    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<Provision> {
        self.journal.write(format!("policy.attach {role}"));
        if !self.roles.lock().expect("lock").contains(role) {
            anyhow::bail!("NoSuchEntity: role {role}");
        }
        self.attachments
            .lock()
            .expect("lock")
            .insert((role.to_string(), policy_arn.to_string()));
        Ok(Provision::Created)
    }

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<Removal> {
        self.journal.write(format!("policy.detach {role}"));
        let removed = self
            .attachments
            .lock()
            .expect("lock")
            .remove(&(role.to_string(), policy_arn.to_string()));
        Ok(if removed { Removal::Removed } else { Removal::AlreadyAbsent })
    }
}

// ===== Domains =====

#[derive(Debug, Clone)]
struct FakeUpgrade {
    stage: UpgradeStage,
    target: EngineVersion,
    polls_left: u32,
    fails: bool,
    /// 🎭 When set, status polls replay these in order and the last one sticks.
    script: VecDeque<UpgradeProgress>,
}

#[derive(Debug, Clone)]
struct FakeDomain {
    status: DomainStatus,
    describes_until_ready: u32,
    upgrade: Option<FakeUpgrade>,
}

/// 🏢 A domain service with the reflexes of a sloth: everything takes a few polls.
#[derive(Debug)]
pub(crate) struct InMemoryDomains {
    domains: Mutex<HashMap<String, FakeDomain>>,
    /// 📡 Endpoint handed to domains created through `create()` (usually a wiremock host).
    endpoint_for_new: String,
    /// 🐢 How many describes/status polls a change stays in progress.
    pub(crate) slowness: u32,
    /// 💀 Eligibility checks for these targets come back FAILED.
    pub(crate) failing_checks: Mutex<HashSet<EngineVersion>>,
    /// 🎭 Status sequences for real (not check-only) upgrades, by target.
    scripted_upgrades: Mutex<HashMap<EngineVersion, Vec<UpgradeProgress>>>,
    journal: Journal,
}

impl InMemoryDomains {
    pub(crate) fn new(journal: Journal, endpoint_for_new: impl Into<String>) -> Self {
        Self {
            domains: Mutex::default(),
            endpoint_for_new: endpoint_for_new.into(),
            slowness: 2,
            failing_checks: Mutex::default(),
            scripted_upgrades: Mutex::default(),
            journal,
        }
    }

    /// 🎭 The upgrade to `target` reports `steps` one poll at a time, then keeps repeating the last.
    pub(crate) fn script_upgrade(self, target: EngineVersion, steps: &[(UpgradeStage, UpgradeOutcome)]) -> Self {
        let steps = steps
            .iter()
            .map(|(stage, outcome)| UpgradeProgress { stage: *stage, outcome: *outcome })
            .collect();
        self.scripted_upgrades.lock().expect("lock").insert(target, steps);
        self
    }

    /// 🏚️ Plant an existing, ready domain (the source side, or a resumed destination).
    pub(crate) fn with_ready_domain(self, name: &str, endpoint: &str, version: EngineVersion) -> Self {
        self.domains.lock().expect("lock").insert(
            name.to_string(),
            FakeDomain {
                status: DomainStatus {
                    name: name.to_string(),
                    arn: format!("arn:aws:es:ap-southeast-2:123456789012:domain/{name}"),
                    processing: false,
                    endpoint: Some(endpoint.to_string()),
                    engine_version: Some(version),
                },
                describes_until_ready: 0,
                upgrade: None,
            },
        );
        self
    }

    pub(crate) fn version_of(&self, name: &str) -> Option<EngineVersion> {
        self.domains
            .lock()
            .expect("lock")
            .get(name)
            .and_then(|d| d.status.engine_version)
    }
}

#[async_trait]
impl DomainService for InMemoryDomains {
    async fn describe(&self, name: &str) -> Result<Option<DomainStatus>> {
        let mut domains = self.domains.lock().expect("lock");
        let Some(domain) = domains.get_mut(name) else {
            return Ok(None);
        };
        if domain.describes_until_ready > 0 {
            domain.describes_until_ready -= 1;
            if domain.describes_until_ready == 0 {
                domain.status.processing = false;
                domain.status.endpoint = Some(self.endpoint_for_new.clone());
            }
        }
        Ok(Some(domain.status.clone()))
    }

    async fn create(&self, spec: &DomainSpec) -> Result<()> {
        self.journal.write(format!("domain.create {} {}", spec.name, spec.engine_version));
        let mut domains = self.domains.lock().expect("lock");
        if domains.contains_key(&spec.name) {
            anyhow::bail!("ResourceAlreadyExistsException: {}", spec.name);
        }
        domains.insert(
            spec.name.clone(),
            FakeDomain {
                status: DomainStatus {
                    name: spec.name.clone(),
                    arn: format!("arn:aws:es:ap-southeast-2:123456789012:domain/{}", spec.name),
                    processing: true,
                    endpoint: None,
                    engine_version: Some(spec.engine_version),
                },
                describes_until_ready: self.slowness.max(1),
                upgrade: None,
            },
        );
        Ok(())
    }

    async fn start_upgrade(&self, name: &str, target: &EngineVersion, check_only: bool) -> Result<()> {
        let kind = if check_only { "check" } else { "upgrade" };
        self.journal.write(format!("domain.{kind} {name} {target}"));
        let fails = check_only && self.failing_checks.lock().expect("lock").contains(target);
        let script: VecDeque<UpgradeProgress> = if check_only {
            VecDeque::new()
        } else {
            self.scripted_upgrades
                .lock()
                .expect("lock")
                .get(target)
                .cloned()
                .unwrap_or_default()
                .into()
        };
        let mut domains = self.domains.lock().expect("lock");
        let domain = domains
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("ResourceNotFoundException: {name}"))?;
        domain.upgrade = Some(FakeUpgrade {
            stage: if check_only { UpgradeStage::PreUpgradeCheck } else { UpgradeStage::Upgrade },
            target: *target,
            polls_left: self.slowness,
            fails,
            script,
        });
        if !check_only {
            domain.status.processing = true;
        }
        Ok(())
    }

    async fn upgrade_status(&self, name: &str) -> Result<UpgradeProgress> {
        let mut domains = self.domains.lock().expect("lock");
        let domain = domains
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("ResourceNotFoundException: {name}"))?;
        let Some(upgrade) = domain.upgrade.as_mut() else {
            return Ok(UpgradeProgress { stage: UpgradeStage::Unknown, outcome: UpgradeOutcome::Unknown });
        };
        if let Some(next) = upgrade.script.front().copied() {
            if upgrade.script.len() > 1 {
                upgrade.script.pop_front();
            }
            match next.outcome {
                UpgradeOutcome::Succeeded | UpgradeOutcome::SucceededWithIssues if next.stage == UpgradeStage::Upgrade => {
                    domain.status.engine_version = Some(upgrade.target);
                    domain.status.processing = false;
                }
                UpgradeOutcome::Failed => domain.status.processing = false,
                _ => {}
            }
            return Ok(next);
        }
        if upgrade.polls_left > 0 {
            upgrade.polls_left -= 1;
            return Ok(UpgradeProgress { stage: upgrade.stage, outcome: UpgradeOutcome::InProgress });
        }
        let outcome = if upgrade.fails { UpgradeOutcome::Failed } else { UpgradeOutcome::Succeeded };
        let progress = UpgradeProgress { stage: upgrade.stage, outcome };
        if upgrade.stage == UpgradeStage::Upgrade {
            domain.status.engine_version = Some(upgrade.target);
            domain.status.processing = false;
        }
        Ok(progress)
    }
}
