//! 📡 Cluster: the HTTP line into a search domain.
//!
//! 🎬 INT. SNAPSHOT REPOSITORY REGISTRATION - ATTEMPT 14
//! "403." "Again?" "IAM is still propagating." "It's been four minutes."
//! "IAM has its own relationship with time."
//!
//! Everything the migration says to a cluster (register a repository, take a
//! snapshot, reindex, seed some movies) goes through [`ClusterClient`]. It knows
//! the base URL and how to authenticate, and it never judges a status code. The
//! caller decides whether a 500 is a tragedy or just Tuesday.
//!
//! 🧠 Knowledge graph:
//! - [`ClusterAuth`]: anonymous, basic, api key, or SigV4 for managed domains.
//! - [`ClusterResponse`]: status + body text, with `ensure_success` for the strict callers.
//! - [`ClusterTarget`]: "talk to this URL" vs "look up this domain and talk to that". 🦆

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::app_config::ClusterConfig;
use crate::cloud::DomainService;

pub mod signing;

pub use signing::SigV4Signer;

/// 🔒 How requests prove who they are.
#[derive(Clone)]
pub enum ClusterAuth {
    Anonymous,
    Basic {
        username: String,
        password: Option<String>,
    },
    ApiKey(String),
    SigV4(SigV4Signer),
}

impl std::fmt::Debug for ClusterAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🔒 secrets stay out of logs. usernames and regions are fine.
        match self {
            ClusterAuth::Anonymous => write!(f, "Anonymous"),
            ClusterAuth::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            ClusterAuth::ApiKey(_) => write!(f, "ApiKey(***)"),
            ClusterAuth::SigV4(signer) => write!(f, "SigV4({})", signer.region()),
        }
    }
}

/// 🎫 Pick the auth flavour from config.
///
/// `sigv4 = true` needs a signer; otherwise api key beats basic beats anonymous.
pub fn auth_for(config: &ClusterConfig, signer: Option<&SigV4Signer>) -> Result<ClusterAuth> {
    if config.sigv4 {
        let signer = signer.context(
            "💀 cluster.sigv4 is on but no SigV4 signer is available. Configure AWS credentials or set cluster.sigv4 = false.",
        )?;
        return Ok(ClusterAuth::SigV4(signer.clone()));
    }
    if let Some(api_key) = &config.api_key {
        return Ok(ClusterAuth::ApiKey(api_key.clone()));
    }
    if let Some(username) = &config.username {
        return Ok(ClusterAuth::Basic {
            username: username.clone(),
            password: config.password.clone(),
        });
    }
    Ok(ClusterAuth::Anonymous)
}

/// 📬 What came back. Status and body, uninterpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResponse {
    pub status: u16,
    pub body: String,
}

impl ClusterResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).context(format!(
            "💀 The cluster answered HTTP {} with something that isn't the JSON we expected: {}",
            self.status,
            truncate(&self.body)
        ))
    }

    /// 🚦 Bail unless 2xx. `what` names the operation for the error message.
    pub fn ensure_success(self, what: &str) -> Result<Self> {
        if !self.is_success() {
            anyhow::bail!(
                "💀 {} failed with HTTP {}: {}",
                what,
                self.status,
                truncate(&self.body)
            );
        }
        Ok(self)
    }
}

// -- ✂️ error bodies can be megabytes of stack trace; 512 chars is plenty to diagnose
fn truncate(body: &str) -> String {
    const LIMIT: usize = 512;
    match body.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// 🎯 Which cluster a standalone command should talk to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterTarget {
    /// A direct URL, scheme included.
    Url(String),
    /// A managed domain, resolved to its endpoint through the domain service.
    Domain(String),
}

/// 🌐 Endpoint host → URL. The service reports bare hosts; tests sometimes hand over full URLs.
pub fn domain_url(scheme: &str, endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("{}://{}", scheme, endpoint.trim_end_matches('/'))
    }
}

/// 📡 A reqwest client pointed at one cluster.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    base_url: String,
    auth: ClusterAuth,
}

impl ClusterClient {
    pub fn new(base_url: impl Into<String>, auth: ClusterAuth, config: &ClusterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably TLS. It's always TLS.")?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!("📡 Cluster client for {} ({:?})", base_url, auth);
        Ok(Self { http, base_url, auth })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<ClusterResponse> {
        self.send(Method::GET, path, None, None).await
    }

    pub async fn put_json(&self, path: &str, body: &serde_json::Value) -> Result<ClusterResponse> {
        self.send(Method::PUT, path, Some(body.to_string()), None).await
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<ClusterResponse> {
        self.send(Method::POST, path, Some(body.to_string()), None).await
    }

    pub async fn post_empty(&self, path: &str) -> Result<ClusterResponse> {
        self.send(Method::POST, path, None, None).await
    }

    pub async fn delete(&self, path: &str) -> Result<ClusterResponse> {
        self.send(Method::DELETE, path, None, None).await
    }

    /// 📤 The one place a request leaves the building.
    ///
    /// `timeout` overrides the client-wide request timeout (long `_reindex` calls).
    /// Non-2xx statuses are returned, not raised. Transport failures are errors.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<ClusterResponse> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        trace!("📤 {} {} body={:?}", method, url, body);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }

        request = match &self.auth {
            ClusterAuth::Anonymous => request,
            ClusterAuth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
            ClusterAuth::ApiKey(api_key) => request.header("authorization", format!("ApiKey {api_key}")),
            ClusterAuth::SigV4(signer) => {
                let signed_headers: &[(&str, &str)] = if body.is_some() {
                    &[("content-type", "application/json")]
                } else {
                    &[]
                };
                let payload = body.as_deref().unwrap_or_default().as_bytes();
                let extra = signer.sign(method.as_str(), &url, signed_headers, payload).await?;
                extra
                    .into_iter()
                    .fold(request, |request, (name, value)| request.header(name, value))
            }
        };

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .context(format!("💀 {method} {url} never got an answer. Check the endpoint, the network, and the access policy."))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .context(format!("💀 {method} {url} answered HTTP {status} but the body got lost on the way"))?;
        debug!("📬 {} {} -> HTTP {}", method, url, status);
        Ok(ClusterResponse { status, body })
    }
}

/// 🔌 Build a client for `target`, resolving domain names through `domains`.
pub async fn connect(
    target: &ClusterTarget,
    domains: &dyn DomainService,
    signer: Option<&SigV4Signer>,
    config: &ClusterConfig,
) -> Result<ClusterClient> {
    let base_url = match target {
        ClusterTarget::Url(url) => url.clone(),
        ClusterTarget::Domain(name) => {
            let status = domains
                .describe(name)
                .await?
                .context(format!("💀 Domain '{name}' does not exist. Can't talk to a ghost."))?;
            let endpoint = status.endpoint.as_deref().context(format!(
                "💀 Domain '{name}' has no endpoint yet. Still provisioning, or it lives in a VPC we can't see."
            ))?;
            domain_url(&config.scheme, endpoint)
        }
    };
    ClusterClient::new(base_url, auth_for(config, signer)?, config)
}
