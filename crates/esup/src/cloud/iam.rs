//! 🔒 IAM backend: the paperwork that lets a domain touch a bucket.
//!
//! One policy. One role. One attachment. Created before the snapshot,
//! shredded after the restore. Bureaucracy, but make it idempotent.
//!
//! 🧠 IAM speaks two dialects of "nope": `EntityAlreadyExists` on create and
//! `NoSuchEntity` on delete/detach. Both are translated into calm
//! [`Provision::AlreadyPresent`] / [`Removal::AlreadyAbsent`] answers here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::AccessControl;
use crate::common::{Provision, Removal};

#[derive(Debug, Clone)]
pub struct AwsAccessControl {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsAccessControl {
    pub fn new(iam: aws_sdk_iam::Client, sts: aws_sdk_sts::Client) -> Self {
        Self { iam, sts }
    }
}

#[async_trait]
impl AccessControl for AwsAccessControl {
    async fn account_id(&self) -> Result<String> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .context("💀 STS GetCallerIdentity failed. We don't even know who we are. Existential, and also a credentials problem.")?;
        identity
            .account()
            .map(str::to_string)
            .context("💀 STS answered without an account id. Rude.")
    }

    async fn ensure_policy(&self, name: &str, document: &str, description: &str) -> Result<Provision> {
        match self
            .iam
            .create_policy()
            .policy_name(name)
            .policy_document(document)
            .description(description)
            .send()
            .await
        {
            Ok(_) => {
                debug!("🔒 Policy {} created", name);
                Ok(Provision::Created)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_entity_already_exists_exception() {
                    debug!("🔒 Policy {} already exists, skipping this step", name);
                    Ok(Provision::AlreadyPresent)
                } else {
                    Err(anyhow::Error::new(service_err).context(format!("💀 Creating policy '{name}' failed")))
                }
            }
        }
    }

    async fn remove_policy(&self, policy_arn: &str) -> Result<Removal> {
        match self.iam.delete_policy().policy_arn(policy_arn).send().await {
            Ok(_) => {
                debug!("🗑️ Policy {} deleted", policy_arn);
                Ok(Removal::Removed)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    debug!("🔒 Policy {} does not exist, skipping this step", policy_arn);
                    Ok(Removal::AlreadyAbsent)
                } else {
                    Err(anyhow::Error::new(service_err).context(format!(
                        "💀 Deleting policy '{policy_arn}' failed. If it's still attached somewhere, IAM won't let go."
                    )))
                }
            }
        }
    }

    async fn ensure_role(&self, name: &str, trust_document: &str, description: &str) -> Result<Provision> {
        match self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_document)
            .description(description)
            .send()
            .await
        {
            Ok(_) => {
                debug!("🔒 Role {} created", name);
                Ok(Provision::Created)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_entity_already_exists_exception() {
                    debug!("🔒 Role {} already exists, skipping this step", name);
                    Ok(Provision::AlreadyPresent)
                } else {
                    Err(anyhow::Error::new(service_err).context(format!("💀 Creating role '{name}' failed")))
                }
            }
        }
    }

    async fn remove_role(&self, name: &str) -> Result<Removal> {
        match self.iam.delete_role().role_name(name).send().await {
            Ok(_) => {
                debug!("🗑️ Role {} deleted", name);
                Ok(Removal::Removed)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    debug!("🔒 Role {} does not exist, skipping this step", name);
                    Ok(Removal::AlreadyAbsent)
                } else {
                    Err(anyhow::Error::new(service_err).context(format!("💀 Deleting role '{name}' failed")))
                }
            }
        }
    }

    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<Provision> {
        // -- 🔁 IAM treats a repeat attach as a no-op success, so Created is as good as it gets
        self.iam
            .attach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .context(format!("💀 Attaching '{policy_arn}' to role '{role}' failed"))?;
        debug!("🔗 Policy {} attached to {}", policy_arn, role);
        Ok(Provision::Created)
    }

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<Removal> {
        match self
            .iam
            .detach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
        {
            Ok(_) => {
                debug!("✂️ Policy {} detached from {}", policy_arn, role);
                Ok(Removal::Removed)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_entity_exception() {
                    debug!("🔗 Attachment {} → {} does not exist, skipping this step", policy_arn, role);
                    Ok(Removal::AlreadyAbsent)
                } else {
                    Err(anyhow::Error::new(service_err)
                        .context(format!("💀 Detaching '{policy_arn}' from role '{role}' failed")))
                }
            }
        }
    }
}
