//! 📦 Common data structures: the small, load-bearing types of esup.
//!
//! 🎬 COLD OPEN: INT. CHANGE ADVISORY BOARD - 9:02 AM
//!
//! "Which version is the new domain on?" asked the manager.
//! "Five point one," said the engineer. "Then five six. Then six eight. Then seven four."
//! "And the old one?" "We don't talk about the old one."
//!
//! This module holds the vocabulary the rest of the crate speaks:
//! [`EngineVersion`] for the numbers on the upgrade path, and the [`Provision`] /
//! [`Removal`] outcomes every idempotent cloud call reports back with. 🦆

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// 🔢 A `major.minor` engine version, like `5.1` or `7.10`.
///
/// Ordered the way humans expect (`7.10 > 7.4`), not the way strings sort
/// (`"7.10" < "7.4"`, a crime scene we refuse to investigate twice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// 🚧 True when going from `self` to `to` jumps a major line (5.x → 6.x).
    /// That's the boundary where the indices need a fresh reindex before the upgrade.
    pub fn crosses_major(&self, to: &EngineVersion) -> bool {
        to.major > self.major
    }
}

impl FromStr for EngineVersion {
    type Err = anyhow::Error;

    /// 🧹 Accepts `"5.1"`, `"7.10"`, and the prefixed flavours the service sometimes
    /// hands back (`"Elasticsearch_7.10"`, `"OpenSearch_1.3"`). A bare `"6"` means `6.0`.
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        // -- 🏷️ strip the vendor prefix, keep the digits
        let digits = trimmed
            .rsplit_once('_')
            .map(|(_, v)| v)
            .unwrap_or(trimmed);

        let mut parts = digits.splitn(3, '.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .context(format!("💀 Version '{raw}' has no major number. It's just vibes."))?
            .parse::<u32>()
            .context(format!("💀 Version '{raw}' has a major number that isn't a number."))?;
        let minor = match parts.next() {
            Some(m) => m
                .parse::<u32>()
                .context(format!("💀 Version '{raw}' has a minor number that isn't a number."))?,
            None => 0,
        };

        Ok(Self { major, minor })
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl<'de> Deserialize<'de> for EngineVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // -- 📜 TOML says "5.6", we say EngineVersion { major: 5, minor: 6 }
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// ✅ What happened when we asked the cloud to make sure something exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provision {
    /// 🏗️ It didn't exist. Now it does. We made that.
    Created,
    /// 😌 It was already there. Nothing to do. Best kind of step.
    AlreadyPresent,
}

/// 🗑️ What happened when we asked the cloud to make something go away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// 👻 Already gone. Someone beat us to it. Possibly us, on a previous run.
    AlreadyAbsent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_versions_sort_like_numbers_not_like_strings() -> Result<()> {
        let seven_four: EngineVersion = "7.4".parse()?;
        let seven_ten: EngineVersion = "7.10".parse()?;
        assert!(seven_ten > seven_four, "7.10 must outrank 7.4. Strings lie. Numbers don't.");
        Ok(())
    }

    #[test]
    fn the_one_where_vendor_prefixes_get_peeled_off() -> Result<()> {
        assert_eq!("Elasticsearch_7.10".parse::<EngineVersion>()?, EngineVersion::new(7, 10));
        assert_eq!("OpenSearch_1.3".parse::<EngineVersion>()?, EngineVersion::new(1, 3));
        assert_eq!("6".parse::<EngineVersion>()?, EngineVersion::new(6, 0));
        Ok(())
    }

    #[test]
    fn the_one_where_garbage_versions_are_turned_away() {
        assert!("".parse::<EngineVersion>().is_err());
        assert!("five.one".parse::<EngineVersion>().is_err());
        assert!("5.x".parse::<EngineVersion>().is_err());
    }

    #[test]
    fn the_one_where_only_major_jumps_count_as_boundaries() {
        let five_one = EngineVersion::new(5, 1);
        let five_six = EngineVersion::new(5, 6);
        let six_eight = EngineVersion::new(6, 8);
        assert!(!five_one.crosses_major(&five_six));
        assert!(five_six.crosses_major(&six_eight));
        assert_eq!(six_eight.to_string(), "6.8");
    }

    #[test]
    fn the_one_where_versions_deserialize_from_plain_strings() -> Result<()> {
        let parsed: Vec<EngineVersion> = serde_json::from_str(r#"["5.6","6.8","7.4"]"#)?;
        assert_eq!(
            parsed,
            vec![EngineVersion::new(5, 6), EngineVersion::new(6, 8), EngineVersion::new(7, 4)]
        );
        Ok(())
    }
}
