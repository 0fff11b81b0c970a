//! 🏢 Managed Elasticsearch domain backend.
//!
//! 🎬 "Your domain is being created. This may take 10-15 minutes."
//! *[narrator: it took 22]*
//!
//! Thin translation layer between the `aws-sdk-elasticsearch` shapes and the
//! crate's own [`DomainStatus`] / [`UpgradeProgress`]. The SDK types stay in here;
//! nothing upstream has to learn what an `EsPartitionInstanceType` is.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_elasticsearch::types::{
    EbsOptions, ElasticsearchClusterConfig, ElasticsearchDomainStatus, EsPartitionInstanceType,
    UpgradeStatus, UpgradeStep, VolumeType,
};
use tracing::{debug, info, warn};

use super::{DomainService, DomainSpec, DomainStatus, UpgradeOutcome, UpgradeProgress, UpgradeStage};
use crate::common::EngineVersion;

#[derive(Debug, Clone)]
pub struct AwsDomainService {
    client: aws_sdk_elasticsearch::Client,
}

impl AwsDomainService {
    pub fn new(client: aws_sdk_elasticsearch::Client) -> Self {
        Self { client }
    }
}

/// 🔭 SDK status → our status. Public endpoint first, VPC endpoint as the fallback.
fn to_domain_status(status: &ElasticsearchDomainStatus) -> DomainStatus {
    let endpoint = status
        .endpoint()
        .map(str::to_string)
        .or_else(|| status.endpoints().and_then(|all| all.get("vpc").cloned()));

    let engine_version = status.elasticsearch_version().and_then(|raw| match raw.parse() {
        Ok(version) => Some(version),
        Err(err) => {
            warn!("🤷 Domain reports a version we can't parse ('{}'): {:#}", raw, err);
            None
        }
    });

    DomainStatus {
        name: status.domain_name().to_string(),
        arn: status.arn().to_string(),
        processing: status.processing().unwrap_or(false),
        endpoint,
        engine_version,
    }
}

fn to_stage(step: Option<&UpgradeStep>) -> UpgradeStage {
    match step {
        Some(UpgradeStep::PreUpgradeCheck) => UpgradeStage::PreUpgradeCheck,
        Some(UpgradeStep::Snapshot) => UpgradeStage::Snapshot,
        Some(UpgradeStep::Upgrade) => UpgradeStage::Upgrade,
        _ => UpgradeStage::Unknown,
    }
}

fn to_outcome(status: Option<&UpgradeStatus>) -> UpgradeOutcome {
    match status {
        Some(UpgradeStatus::InProgress) => UpgradeOutcome::InProgress,
        Some(UpgradeStatus::Succeeded) => UpgradeOutcome::Succeeded,
        Some(UpgradeStatus::SucceededWithIssues) => UpgradeOutcome::SucceededWithIssues,
        Some(UpgradeStatus::Failed) => UpgradeOutcome::Failed,
        _ => UpgradeOutcome::Unknown,
    }
}

#[async_trait]
impl DomainService for AwsDomainService {
    async fn describe(&self, name: &str) -> Result<Option<DomainStatus>> {
        match self
            .client
            .describe_elasticsearch_domain()
            .domain_name(name)
            .send()
            .await
        {
            Ok(output) => {
                let status = output
                    .domain_status()
                    .context(format!("💀 DescribeElasticsearchDomain for '{name}' came back without a DomainStatus"))?;
                Ok(Some(to_domain_status(status)))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_resource_not_found_exception() {
                    debug!("🔭 Domain '{}' does not exist (yet)", name);
                    Ok(None)
                } else {
                    Err(anyhow::Error::new(service_err).context(format!("💀 Describing domain '{name}' failed")))
                }
            }
        }
    }

    async fn create(&self, spec: &DomainSpec) -> Result<()> {
        let cluster_config = ElasticsearchClusterConfig::builder()
            .instance_type(EsPartitionInstanceType::from(spec.instance_type.as_str()))
            .instance_count(spec.instance_count)
            .dedicated_master_enabled(spec.dedicated_master_enabled)
            .build();
        let ebs_options = EbsOptions::builder()
            .ebs_enabled(true)
            .volume_type(VolumeType::from(spec.ebs_volume_type.as_str()))
            .volume_size(spec.ebs_volume_size_gb)
            .build();

        let output = self
            .client
            .create_elasticsearch_domain()
            .domain_name(&spec.name)
            .elasticsearch_version(spec.engine_version.to_string())
            .elasticsearch_cluster_config(cluster_config)
            .ebs_options(ebs_options)
            .access_policies(&spec.access_policy)
            .send()
            .await
            .context(format!(
                "💀 CreateElasticsearchDomain for '{}' ({} x {}, ES {}) was refused",
                spec.name, spec.instance_count, spec.instance_type, spec.engine_version
            ))?;

        info!(
            "🏗️ Domain {} created, ARN: {}",
            spec.name,
            output.domain_status().map(|s| s.arn()).unwrap_or("<not reported>")
        );
        Ok(())
    }

    async fn start_upgrade(&self, name: &str, target: &EngineVersion, check_only: bool) -> Result<()> {
        self.client
            .upgrade_elasticsearch_domain()
            .domain_name(name)
            .target_version(target.to_string())
            .perform_check_only(check_only)
            .send()
            .await
            .context(format!(
                "💀 UpgradeElasticsearchDomain (check_only={check_only}) for '{name}' → {target} was refused"
            ))?;
        Ok(())
    }

    async fn upgrade_status(&self, name: &str) -> Result<UpgradeProgress> {
        let output = self
            .client
            .get_upgrade_status()
            .domain_name(name)
            .send()
            .await
            .context(format!("💀 GetUpgradeStatus for '{name}' failed"))?;

        Ok(UpgradeProgress {
            stage: to_stage(output.upgrade_step()),
            outcome: to_outcome(output.step_status()),
        })
    }
}
