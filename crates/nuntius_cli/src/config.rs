use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result, ensure};
use nuntius::MalformedPolicy;
use serde::Deserialize;

/// Contents of `nuntius.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub feed: FeedConfig,
    pub poller: PollerConfig,
    pub log: LogConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Maximum records per batch.
    pub batch_size: usize,
    /// Batches buffered between the reader thread and the poller.
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            channel_capacity: 4,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerConfig {
    pub on_malformed: OnMalformed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMalformed {
    Skip,
    #[default]
    Abort,
}

impl From<OnMalformed> for MalformedPolicy {
    fn from(value: OnMalformed) -> Self {
        match value {
            OnMalformed::Skip => MalformedPolicy::Skip,
            OnMalformed::Abort => MalformedPolicy::Abort,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Cache-key prefixes per source table.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub prefixes: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let prefixes = [
            ("groups_group", "GRP"),
            ("groups_groupmember", "GRPMEM"),
            ("users_user", "USR"),
        ];

        Self {
            prefixes: prefixes
                .into_iter()
                .map(|(table, prefix)| (table.to_string(), prefix.to_string()))
                .collect(),
        }
    }
}

impl StoreConfig {
    /// The prefix configured for `table`, or the table name itself.
    pub fn prefix<'a>(&'a self, table: &'a str) -> &'a str {
        self.prefixes.get(table).map(String::as_str).unwrap_or(table)
    }
}

impl Config {
    /// Read `path`. A missing file is only an error when `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;

        ensure!(config.feed.batch_size > 0, "feed.batch_size must be positive");
        ensure!(
            config.feed.channel_capacity > 0,
            "feed.channel_capacity must be positive"
        );

        Ok(config)
    }
}
