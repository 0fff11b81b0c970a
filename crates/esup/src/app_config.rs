//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Layering, bottom to top:
//! 1. legacy env vars the old scripts read (`OLD_DOMAIN_NAME`, `NEW_DOMAIN_NAME`, ...)
//! 2. `ESUP_*` env vars, nested with `__` (`ESUP_DESTINATION__NAME=new-domain`)
//! 3. the TOML file, if one was given. TOML wins.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::common::EngineVersion;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🏚️ The domain we are leaving behind. It gets snapshotted, not touched.
    /// Only the cloud steps need it; standalone reindex/seed against a URL don't.
    #[serde(default)]
    pub source_domain: String,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub upgrade: UpgradeConfig,
    #[serde(default)]
    pub reindex: ReindexConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// ☁️ Where the AWS clients point and which region SigV4 signs for.
/// `None` lets the default provider chain decide (env, profile, IMDS, prayer).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,
}

/// 🏗️ The shape of the brand-new domain we stand up and then upgrade, hop by hop.
#[derive(Debug, Deserialize, Clone)]
pub struct DestinationConfig {
    #[serde(default)]
    pub name: String,
    /// 🔢 The version the domain is born with. Must match what the source can restore into.
    #[serde(default = "default_engine_version")]
    pub engine_version: EngineVersion,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_instance_count")]
    pub instance_count: i32,
    #[serde(default)]
    pub dedicated_master_enabled: bool,
    #[serde(default = "default_ebs_volume_type")]
    pub ebs_volume_type: String,
    #[serde(default = "default_ebs_volume_size_gb")]
    pub ebs_volume_size_gb: i32,
    /// 🔒 Resource policy JSON. Absent means the wide-open statement the old scripts used.
    /// Please set this. Please. The internet is not your friend.
    #[serde(default)]
    pub access_policy: Option<String>,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            engine_version: default_engine_version(),
            instance_type: default_instance_type(),
            instance_count: default_instance_count(),
            dedicated_master_enabled: false,
            ebs_volume_type: default_ebs_volume_type(),
            ebs_volume_size_gb: default_ebs_volume_size_gb(),
            access_policy: None,
        }
    }
}

impl AppConfig {
    /// 🏷️ The cloud steps (setup, snapshot, teardown, upgrade) need both domain names.
    pub fn require_domains(&self) -> anyhow::Result<()> {
        let missing: Vec<&str> = [
            ("source_domain", self.source_domain.as_str()),
            ("destination.name", self.destination.name.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();
        if !missing.is_empty() {
            anyhow::bail!(
                "💀 Missing {} in the config. Set them in the TOML, or via ESUP_* / OLD_DOMAIN_NAME / NEW_DOMAIN_NAME.",
                missing.join(" and ")
            );
        }
        Ok(())
    }
}

/// 🪣 Snapshot plumbing: the bucket, the repository, and the IAM pair that lets the
/// domain write into the bucket.
#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_bucket_region")]
    pub bucket_region: String,
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_snapshot_name")]
    pub snapshot_name: String,
    #[serde(default = "default_role_name")]
    pub role_name: String,
    #[serde(default = "default_policy_name")]
    pub policy_name: String,
    /// 🎯 Optional `indices` pattern for the restore call. None restores everything.
    #[serde(default)]
    pub restore_indices: Option<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            bucket_region: default_bucket_region(),
            repository: default_repository(),
            snapshot_name: default_snapshot_name(),
            role_name: default_role_name(),
            policy_name: default_policy_name(),
            restore_indices: None,
        }
    }
}

/// 🪜 The version staircase. Each entry is one hop.
#[derive(Debug, Deserialize, Clone)]
pub struct UpgradeConfig {
    #[serde(default = "default_upgrade_path")]
    pub path: Vec<EngineVersion>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self { path: default_upgrade_path() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReindexConfig {
    /// 🏷️ Appended to every index name during the forward pass, stripped on the way back.
    #[serde(default = "default_reindex_suffix")]
    pub suffix: String,
    /// ⏱️ `_reindex` runs with wait_for_completion, so big indices need a long leash.
    #[serde(default = "default_reindex_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 💤 How long to let a freshly opened index find its shards.
    #[serde(default = "default_open_settle_ms")]
    pub open_settle_ms: u64,
    /// 🫣 `.kibana` and friends. Left alone unless you really mean it.
    #[serde(default)]
    pub include_dot_indices: bool,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            suffix: default_reindex_suffix(),
            request_timeout_secs: default_reindex_request_timeout_secs(),
            open_settle_ms: default_open_settle_ms(),
            include_dot_indices: false,
        }
    }
}

/// 🔄 Knobs for every "are we there yet?" loop in the crate.
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_upgrade_interval_ms")]
    pub upgrade_interval_ms: u64,
    /// 💤 Pause after kicking off a check/upgrade before the first status read,
    /// so we don't read the previous operation's tombstone.
    #[serde(default = "default_upgrade_settle_ms")]
    pub upgrade_settle_ms: u64,
    /// 🛑 None = poll until the heat death of the universe, like the old scripts did.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            upgrade_interval_ms: default_upgrade_interval_ms(),
            upgrade_settle_ms: default_upgrade_settle_ms(),
            max_attempts: None,
        }
    }
}

/// 📡 How we talk HTTP to the clusters themselves.
///
/// 🔒 Auth priority when `sigv4` is off: api_key, then basic, then anonymous.
/// Same hierarchy the bulk sink always used. This is not a democracy.
#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// 🎯 A direct URL. When set, standalone commands skip the domain lookup.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub sigv4: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            url: None,
            sigv4: true,
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// 🔢 5.1: the version the source domains were stuck on when this whole saga began.
fn default_engine_version() -> EngineVersion {
    EngineVersion::new(5, 1)
}

fn default_instance_type() -> String {
    "m5.xlarge.elasticsearch".to_string()
}

fn default_instance_count() -> i32 {
    1
}

fn default_ebs_volume_type() -> String {
    "standard".to_string()
}

// 📦 10 GB. Enough for the sample data, not enough for your production logs. Adjust.
fn default_ebs_volume_size_gb() -> i32 {
    10
}

fn default_bucket() -> String {
    "es-automated-update".to_string()
}

fn default_bucket_region() -> String {
    "ap-southeast-2".to_string()
}

fn default_repository() -> String {
    "es-index-backups".to_string()
}

fn default_snapshot_name() -> String {
    "snapshot".to_string()
}

fn default_role_name() -> String {
    "es-snapshots-role".to_string()
}

fn default_policy_name() -> String {
    "es-snapshot-policy".to_string()
}

// 🪜 5.1 → 5.6 → 6.8 → 7.4. Two major boundaries, two reindex passes, one long afternoon.
fn default_upgrade_path() -> Vec<EngineVersion> {
    vec![
        EngineVersion::new(5, 6),
        EngineVersion::new(6, 8),
        EngineVersion::new(7, 4),
    ]
}

fn default_reindex_suffix() -> String {
    "-reindex".to_string()
}

fn default_reindex_request_timeout_secs() -> u64 {
    300
}

fn default_open_settle_ms() -> u64 {
    5_000
}

fn default_interval_ms() -> u64 {
    2_000
}

fn default_upgrade_interval_ms() -> u64 {
    10_000
}

fn default_upgrade_settle_ms() -> u64 {
    10_000
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// 🗺️ Old script env var → config path. The scripts are gone, the muscle memory isn't.
const LEGACY_ENV_VARS: &[(&str, &str)] = &[
    ("OLD_DOMAIN_NAME", "source_domain"),
    ("NEW_DOMAIN_NAME", "destination.name"),
    ("INSTANCE_TYPE", "destination.instance_type"),
    ("BUCKET_NAME", "snapshot.bucket"),
    ("BUCKET_REGION", "snapshot.bucket_region"),
    ("AUTH_REGION", "aws.region"),
];

fn legacy_env() -> Env {
    let names: Vec<&'static str> = LEGACY_ENV_VARS.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        let the_new_address = LEGACY_ENV_VARS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| (*path).to_string())
            .unwrap_or_else(|| key.as_str().to_string());
        the_new_address.into()
    })
}

/// 🧱 The layered figment, exposed so tests can poke at it without touching disk.
pub fn figment(config_file_name: Option<&Path>) -> Figment {
    // 🏗️ Base layer: legacy names, then the ESUP_ prefix on top.
    let config = Figment::new()
        .merge(legacy_env())
        .merge(Env::prefixed("ESUP_").split("__"));

    match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// - `None` → env vars only. No file. No assumptions.
/// - `Some(path)` → env vars + TOML file, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (ESUP_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESUP_* and the legacy \
                 OLD_DOMAIN_NAME/NEW_DOMAIN_NAME crew). No file was provided, so this one's all on the environment."
            .to_string(),
    };

    figment(config_file_name).extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut the_file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        the_file
    }

    #[test]
    fn the_one_where_a_minimal_config_inherits_the_whole_saga() {
        let the_file = write_test_config(
            r#"
            source_domain = "old-and-tired"

            [destination]
            name = "new-and-shiny"
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(the_file.path()))
            .extract()
            .expect("💀 Minimal config should parse. Defaults left us on read otherwise.");

        assert_eq!(app_config.source_domain, "old-and-tired");
        assert_eq!(app_config.destination.name, "new-and-shiny");
        assert_eq!(app_config.destination.engine_version, EngineVersion::new(5, 1));
        assert_eq!(app_config.destination.instance_type, "m5.xlarge.elasticsearch");
        assert_eq!(app_config.destination.ebs_volume_size_gb, 10);
        assert_eq!(app_config.snapshot.bucket, "es-automated-update");
        assert_eq!(app_config.snapshot.repository, "es-index-backups");
        assert_eq!(app_config.snapshot.role_name, "es-snapshots-role");
        assert_eq!(app_config.reindex.suffix, "-reindex");
        assert_eq!(app_config.reindex.request_timeout_secs, 300);
        assert_eq!(app_config.polling.interval_ms, 2_000);
        assert!(app_config.polling.max_attempts.is_none());
        assert!(app_config.cluster.sigv4);
        assert_eq!(
            app_config.upgrade.path,
            vec![EngineVersion::new(5, 6), EngineVersion::new(6, 8), EngineVersion::new(7, 4)]
        );
    }

    #[test]
    fn the_one_where_the_toml_overrides_everything_it_touches() {
        let the_file = write_test_config(
            r#"
            source_domain = "legacy"

            [destination]
            name = "shiny"
            engine_version = "6.8"
            instance_count = 3

            [upgrade]
            path = ["7.10"]

            [polling]
            interval_ms = 5
            max_attempts = 7

            [cluster]
            scheme = "http"
            sigv4 = false
            username = "elastic"
            "#,
        );

        let app_config = load_config(Some(the_file.path()))
            .expect("💀 Override config should parse. The schema drift goblin does not get this win.");

        assert_eq!(app_config.destination.engine_version, EngineVersion::new(6, 8));
        assert_eq!(app_config.destination.instance_count, 3);
        assert_eq!(app_config.upgrade.path, vec![EngineVersion::new(7, 10)]);
        assert_eq!(app_config.polling.interval_ms, 5);
        assert_eq!(app_config.polling.max_attempts, Some(7));
        assert_eq!(app_config.cluster.scheme, "http");
        assert!(!app_config.cluster.sigv4);
        assert_eq!(app_config.cluster.username.as_deref(), Some("elastic"));
    }

    #[test]
    fn the_one_where_a_url_only_config_parses_but_cannot_run_cloud_steps() {
        let the_file = write_test_config(
            r#"
            [cluster]
            url = "http://localhost:9200"
            sigv4 = false
            "#,
        );

        let app_config = load_config(Some(the_file.path())).expect("💀 A URL-only config should parse.");
        assert_eq!(app_config.cluster.url.as_deref(), Some("http://localhost:9200"));
        assert_eq!(app_config.destination.engine_version, EngineVersion::new(5, 1));

        let the_message = format!("{:#}", app_config.require_domains().expect_err("no domains configured"));
        assert!(the_message.contains("source_domain and destination.name"), "got: {the_message}");
    }

    #[test]
    fn the_one_where_both_domain_names_satisfy_the_cloud_steps() {
        let the_file = write_test_config(
            r#"
            source_domain = "old"

            [destination]
            name = "new"
            "#,
        );
        let app_config = load_config(Some(the_file.path())).expect("💀 Minimal config should parse.");
        assert!(app_config.require_domains().is_ok());
    }

    #[test]
    fn the_one_where_the_old_script_env_vars_still_get_a_seat_at_the_table() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OLD_DOMAIN_NAME", "from-the-before-times");
            jail.set_env("NEW_DOMAIN_NAME", "from-the-after-times");
            jail.set_env("BUCKET_NAME", "legacy-bucket");
            jail.set_env("ESUP_SNAPSHOT__SNAPSHOT_NAME", "nightly");

            let app_config: AppConfig = figment(None).extract()?;

            assert_eq!(app_config.source_domain, "from-the-before-times");
            assert_eq!(app_config.destination.name, "from-the-after-times");
            assert_eq!(app_config.snapshot.bucket, "legacy-bucket");
            assert_eq!(app_config.snapshot.snapshot_name, "nightly");
            Ok(())
        });
    }

    #[test]
    fn the_one_where_a_missing_destination_is_a_hard_no_for_the_cloud_steps() {
        let the_file = write_test_config(r#"source_domain = "lonely""#);

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(the_file.path()))
            .extract()
            .expect("💀 Domain names are optional at parse time.");

        let the_message = format!("{:#}", app_config.require_domains().expect_err("no destination, no migration"));
        assert!(the_message.contains("Missing destination.name"), "got: {the_message}");
    }
}
