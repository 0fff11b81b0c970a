//! 🔧 AwsCloud: one SDK config, many clients, zero hand-rolled credential parsing.
//!
//! aws-config's defaults check: env vars → ~/.aws/config → SSO → IMDS → hope.

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use super::{AwsAccessControl, AwsBucketStore, AwsDomainService};
use crate::app_config::AwsConfig;
use crate::cluster::SigV4Signer;

/// ☁️ The real cloud, as opposed to the one we keep in a `Mutex` for tests.
#[derive(Debug, Clone)]
pub struct AwsCloud {
    sdk_config: SdkConfig,
}

impl AwsCloud {
    /// 🚀 Load the shared SDK config once. Every client below is built from it.
    pub async fn connect(aws: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &aws.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        info!(
            "☁️ AWS config loaded, region: {}",
            sdk_config.region().map(|r| r.as_ref()).unwrap_or("<provider chain default>")
        );
        Self { sdk_config }
    }

    pub fn domains(&self) -> AwsDomainService {
        AwsDomainService::new(aws_sdk_elasticsearch::Client::new(&self.sdk_config))
    }

    /// 🪣 The S3 client is pinned to the bucket's region; buckets are picky like that.
    pub fn buckets(&self, bucket_region: &str) -> AwsBucketStore {
        let s3_config = aws_sdk_s3::config::Builder::from(&self.sdk_config)
            .region(Region::new(bucket_region.to_string()))
            .build();
        AwsBucketStore::new(aws_sdk_s3::Client::from_conf(s3_config))
    }

    pub fn access_control(&self) -> AwsAccessControl {
        AwsAccessControl::new(
            aws_sdk_iam::Client::new(&self.sdk_config),
            aws_sdk_sts::Client::new(&self.sdk_config),
        )
    }

    /// ✍️ A SigV4 signer for talking to domain endpoints directly.
    pub fn signer(&self) -> Result<SigV4Signer> {
        let credentials = self
            .sdk_config
            .credentials_provider()
            .context("💀 No AWS credentials provider in the environment. Set AWS_PROFILE or the AWS_* keys, or turn cluster.sigv4 off.")?;
        let region = self
            .sdk_config
            .region()
            .context("💀 No AWS region configured. Set aws.region (or AUTH_REGION, for the nostalgic).")?;
        Ok(SigV4Signer::new(credentials, region.as_ref().to_string()))
    }
}
