//! ✍️ SigV4 signing for requests to managed domain endpoints.
//!
//! A managed domain with an IAM-based access policy wants every request signed
//! with the caller's credentials for service `es`. Unsigned requests get a 403
//! and a lecture. This module does the handshake so `ClusterClient` doesn't have to.

use std::time::SystemTime;

use anyhow::{Context, Result};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningParams, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;

/// 🏷️ The signing name of the Elasticsearch service. Yes, just "es".
const SERVICE_NAME: &str = "es";

/// ✍️ Holds a credentials provider and a region; signs on demand.
#[derive(Clone)]
pub struct SigV4Signer {
    credentials: SharedCredentialsProvider,
    region: String,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🔒 the provider stays out of the logs, the region is harmless
        f.debug_struct("SigV4Signer")
            .field("region", &self.region)
            .finish()
    }
}

impl SigV4Signer {
    pub fn new(credentials: SharedCredentialsProvider, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// 🔏 Returns the headers to add (`authorization`, `x-amz-date`, and
    /// `x-amz-security-token` for session credentials).
    ///
    /// `headers` must be exactly what will go on the wire, minus `host`, which the
    /// signer derives from the URL.
    pub async fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .context("💀 Couldn't resolve AWS credentials for SigV4. The provider chain came up empty.")?;
        let identity: Identity = credentials.into();

        let signing_params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SERVICE_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .context("💀 SigV4 signing params refused to assemble")?
            .into();

        let signable = SignableRequest::new(
            method,
            url,
            headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .context(format!("💀 Couldn't turn {method} {url} into a signable request"))?;

        let (instructions, _signature) = sign(signable, &signing_params)
            .context(format!("💀 Signing {method} {url} failed"))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::Credentials;

    fn signer_with(session_token: Option<&str>) -> SigV4Signer {
        let the_credentials = Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            session_token.map(str::to_string),
            None,
            "test",
        );
        SigV4Signer::new(SharedCredentialsProvider::new(the_credentials), "ap-southeast-2")
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn the_one_where_the_request_gets_its_secret_handshake() -> Result<()> {
        let the_headers = signer_with(None)
            .sign(
                "PUT",
                "https://search-demo.ap-southeast-2.es.amazonaws.com/_snapshot/es-index-backups",
                &[("content-type", "application/json")],
                br#"{"type":"s3"}"#,
            )
            .await?;

        let the_authorization = header(&the_headers, "authorization").expect("authorization header missing");
        assert!(the_authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(the_authorization.contains("/ap-southeast-2/es/aws4_request"));
        assert!(the_authorization.contains("content-type"), "signed headers should include content-type");
        assert!(header(&the_headers, "x-amz-date").is_some());
        assert!(header(&the_headers, "x-amz-security-token").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_session_credentials_bring_their_token_along() -> Result<()> {
        let the_headers = signer_with(Some("SESSION-TOKEN"))
            .sign("GET", "https://search-demo.es.amazonaws.com/_cluster/state/metadata", &[], b"")
            .await?;

        assert_eq!(header(&the_headers, "x-amz-security-token"), Some("SESSION-TOKEN"));
        Ok(())
    }
}
