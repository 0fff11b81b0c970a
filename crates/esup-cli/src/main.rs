//! 🚀 esup-cli: the front door, the bouncer, the maitre d' of esup.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin wrapper: parse flags, set up logging, load config, then let the
//! library do the heavy lifting. Like a manager. 🦆

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use esup::Operation;
use esup::cluster::ClusterTarget;
use esup::common::EngineVersion;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🔧 the ol' reliable
const DEFAULT_CONFIG_FILE: &str = "esup.toml";

#[derive(Debug, Parser)]
#[command(name = "esup-cli", version, about = "Migrate an Elasticsearch domain and upgrade it hop by hop")]
struct Cli {
    /// TOML config file. Defaults to ./esup.toml when it exists, env vars otherwise.
    #[arg(long, short, env = "ESUP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Setup, snapshot + restore, teardown, then every upgrade hop
    Migrate,
    /// Create the bucket, the destination domain, and the IAM policy + role
    Setup,
    /// Register repositories, snapshot the source, restore into the destination
    Snapshot,
    /// Delete the bucket and the IAM policy + role
    Teardown,
    /// Upgrade the destination along upgrade.path
    Upgrade {
        /// Stop after this version (must be on the path)
        #[arg(long)]
        to: Option<EngineVersion>,
    },
    /// Reindex every index into a suffixed sibling, then swap back
    Reindex {
        #[command(flatten)]
        target: TargetArgs,
        /// Stop after the forward pass
        #[arg(long)]
        no_swap: bool,
    },
    /// Insert the sample movie and employee documents
    Seed {
        #[command(flatten)]
        target: TargetArgs,
        /// Use `_doc` instead of mapping types (6.x and later)
        #[arg(long)]
        typeless: bool,
    },
}

#[derive(Debug, Args)]
#[group(multiple = false)]
struct TargetArgs {
    /// Cluster URL, scheme included
    #[arg(long)]
    url: Option<String>,
    /// Managed domain name, resolved to its endpoint
    #[arg(long)]
    domain: Option<String>,
}

impl TargetArgs {
    /// 🎯 --url, then --domain, then cluster.url from config.
    fn resolve(self, configured_url: Option<&str>) -> Result<ClusterTarget> {
        match (self.url, self.domain, configured_url) {
            (Some(url), _, _) => Ok(ClusterTarget::Url(url)),
            (None, Some(domain), _) => Ok(ClusterTarget::Domain(domain)),
            (None, None, Some(url)) => Ok(ClusterTarget::Url(url.to_string())),
            (None, None, None) => anyhow::bail!("💀 No cluster to talk to. Pass --url or --domain, or set cluster.url."),
        }
    }
}

/// 📁 An explicit --config must exist. The default file is optional.
fn config_file(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().context(format!(
                "💀 Couldn't check whether '{}' exists. Permissions, or a path from another dimension.",
                path.display()
            ))?;
            if !exists {
                anyhow::bail!(
                    "💀 Configuration file '{}' does not exist. Relative paths are relative to where you ran this, not where the binary lives.",
                    path.display()
                );
            }
            Ok(Some(path))
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            Ok(default.is_file().then(|| default.to_path_buf()))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = config_file(cli.config)?;
    let app_config = esup::app_config::load_config(config_path.as_deref())
        .context("💀 Couldn't load the configuration. Check the file and the ESUP_* variables.")?;

    let configured_url = app_config.cluster.url.clone();
    let operation = match cli.command {
        Command::Migrate => Operation::Migrate,
        Command::Setup => Operation::Setup,
        Command::Snapshot => Operation::Snapshot,
        Command::Teardown => Operation::Teardown,
        Command::Upgrade { to } => Operation::Upgrade { to },
        Command::Reindex { target, no_swap } => Operation::Reindex {
            target: target.resolve(configured_url.as_deref())?,
            swap: !no_swap,
        },
        Command::Seed { target, typeless } => Operation::Seed {
            target: target.resolve(configured_url.as_deref())?,
            typeless,
        },
    };

    esup::run(app_config, operation).await
}

#[tokio::main]
async fn main() {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut smells_like_the_network = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
                || cause_str.contains("dispatch failure")
            {
                smells_like_the_network = true;
            }
        }

        if smells_like_the_network {
            error!(
                "🔧 hint: something isn't reachable. Check the domain endpoint, its access policy, \
                 and your AWS credentials/region (`aws sts get-caller-identity` is a good first test). \
                 VPC domains are only reachable from inside the VPC."
            );
        }

        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn the_one_where_the_flags_make_sense_to_clap() {
        Cli::command().debug_assert();
    }

    #[test]
    fn the_one_where_reindex_takes_a_domain_and_skips_the_swap() -> Result<()> {
        let the_cli = Cli::try_parse_from(["esup-cli", "reindex", "--domain", "new", "--no-swap"])?;
        match the_cli.command {
            Command::Reindex { target, no_swap } => {
                assert!(no_swap);
                assert_eq!(target.resolve(None)?, ClusterTarget::Domain("new".to_string()));
            }
            other => panic!("parsed into the wrong command: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn the_one_where_url_and_domain_cannot_both_show_up() {
        let the_result = Cli::try_parse_from(["esup-cli", "seed", "--url", "http://localhost:9200", "--domain", "old"]);
        assert!(the_result.is_err());
    }

    #[test]
    fn the_one_where_the_configured_url_is_the_fallback() -> Result<()> {
        let the_target = TargetArgs { url: None, domain: None }.resolve(Some("http://localhost:9200"))?;
        assert_eq!(the_target, ClusterTarget::Url("http://localhost:9200".to_string()));
        assert!(TargetArgs { url: None, domain: None }.resolve(None).is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_upgrade_to_parses_a_version() -> Result<()> {
        let the_cli = Cli::try_parse_from(["esup-cli", "upgrade", "--to", "6.8"])?;
        match the_cli.command {
            Command::Upgrade { to } => assert_eq!(to, Some(EngineVersion::new(6, 8))),
            other => panic!("parsed into the wrong command: {other:?}"),
        }
        Ok(())
    }
}
