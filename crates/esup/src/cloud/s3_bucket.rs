//! 🪣 S3 bucket backend: the snapshot's temporary home.
//!
//! INT. AWS CONSOLE. A bucket named `es-automated-update` is born, filled with
//! shard files, drained, and deleted, all within an afternoon. It never asked
//! for any of this. Neither did we.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use tracing::{debug, warn};

use super::BucketStore;
use crate::common::{Provision, Removal};

/// 🗑️ DeleteObjects accepts at most 1000 keys per call. AWS said so.
const DELETE_BATCH: usize = 1000;

#[derive(Debug, Clone)]
pub struct AwsBucketStore {
    client: aws_sdk_s3::Client,
}

impl AwsBucketStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::Error::new(service_err)
                        .context(format!("💀 HEAD on bucket '{bucket}' failed for reasons other than 'not found'. Permissions, probably.")))
                }
            }
        }
    }

    /// 🧹 Delete every object, one listing page at a time.
    async fn empty_bucket(&self, bucket: &str) -> Result<usize> {
        let mut deleted = 0usize;
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context(format!("💀 Listing objects in '{bucket}' failed. Can't empty what we can't see."))?;

            let keys: Vec<String> = page
                .contents()
                .iter()
                .filter_map(|object| object.key().map(str::to_string))
                .collect();

            for chunk in keys.chunks(DELETE_BATCH) {
                let identifiers = chunk
                    .iter()
                    .map(|key| ObjectIdentifier::builder().key(key).build())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .context("💀 Couldn't build object identifiers for DeleteObjects")?;
                let delete = Delete::builder()
                    .set_objects(Some(identifiers))
                    .quiet(true)
                    .build()
                    .context("💀 Couldn't build the DeleteObjects request")?;
                self.client
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete)
                    .send()
                    .await
                    .context(format!("💀 DeleteObjects on '{bucket}' failed mid-cleanup"))?;
                deleted += chunk.len();
                debug!("🗑️ deleted {} objects from '{}' so far", deleted, bucket);
            }

            match (page.is_truncated().unwrap_or(false), page.next_continuation_token()) {
                (true, Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(deleted)
    }
}

#[async_trait]
impl BucketStore for AwsBucketStore {
    async fn ensure_bucket(&self, bucket: &str, region: &str) -> Result<Provision> {
        if self.bucket_exists(bucket).await? {
            debug!("🪣 Bucket '{}' already exists, skipping this step", bucket);
            return Ok(Provision::AlreadyPresent);
        }

        let mut request = self
            .client
            .create_bucket()
            .bucket(bucket)
            .acl(BucketCannedAcl::Private);
        // -- 🏖️ us-east-1 is special: it rejects its own name as a location constraint
        if region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                debug!("🪣 Bucket '{}' created in {}", bucket, region);
                Ok(Provision::Created)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_bucket_already_owned_by_you() {
                    warn!("🪣 Bucket '{}' appeared between HEAD and CREATE. It's ours. Moving on.", bucket);
                    Ok(Provision::AlreadyPresent)
                } else {
                    Err(anyhow::Error::new(service_err)
                        .context(format!("💀 Creating bucket '{bucket}' in {region} failed. If someone else owns that name, pick another.")))
                }
            }
        }
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<Removal> {
        if !self.bucket_exists(bucket).await? {
            debug!("🪣 Bucket '{}' does not exist, skipping this step", bucket);
            return Ok(Removal::AlreadyAbsent);
        }

        let emptied = self.empty_bucket(bucket).await?;
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .context(format!("💀 Bucket '{bucket}' was emptied ({emptied} objects) but refused to be deleted"))?;
        debug!("🗑️ Bucket '{}' deleted after evicting {} objects", bucket, emptied);
        Ok(Removal::Removed)
    }
}
