//! Daemon configuration.
//!
//! One TOML file declares the queue root, the runner tuning, the news
//! server, and every mailing list. Unknown keys are rejected at load
//! time so a typo fails startup instead of silently meaning nothing.

use std::{path::PathBuf, time::Duration};

use herald_common::list::ListConfig;
use herald_runners::{RunnerSettings, nntp::NntpServer};
use serde::Deserialize;

/// Top-level daemon configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root directory holding the queue directories.
    #[serde(default = "defaults::queue_root")]
    pub queue_root: PathBuf,

    /// Directory holding the per-list digest accumulators.
    #[serde(default = "defaults::digest_state_dir")]
    pub digest_state_dir: PathBuf,

    #[serde(default)]
    pub runner: RunnerConfig,

    /// News server connection; without it the news queue is not served.
    #[serde(default)]
    pub nntp: Option<NntpConfig>,

    /// The mailing lists this daemon serves.
    #[serde(alias = "list", default)]
    pub lists: Vec<ListConfig>,
}

/// Tuning shared by every runner this process spawns.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Failures tolerated per item before it is shunted.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Milliseconds to sleep between scans of an empty queue.
    #[serde(default = "defaults::idle_ms")]
    pub idle_ms: u64,

    /// This process's slice of each queue's keyspace.
    #[serde(default)]
    pub slice: usize,

    /// Total slices each queue is partitioned into across processes.
    #[serde(default = "defaults::num_slices")]
    pub num_slices: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            idle_ms: defaults::idle_ms(),
            slice: 0,
            num_slices: defaults::num_slices(),
        }
    }
}

impl RunnerConfig {
    /// Settings for one queue's runner.
    #[must_use]
    pub fn settings_for(&self, queue: &str) -> RunnerSettings {
        let mut settings = RunnerSettings::new(queue);
        settings.slice = self.slice;
        settings.num_slices = self.num_slices;
        settings.max_retries = self.max_retries;
        settings.idle_interval = Duration::from_millis(self.idle_ms);
        settings
    }
}

/// News server connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NntpConfig {
    /// `host:port` of the news server.
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl From<NntpConfig> for NntpServer {
    fn from(config: NntpConfig) -> Self {
        Self {
            address: config.address,
            username: config.username,
            password: config.password,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn queue_root() -> PathBuf {
        PathBuf::from("/var/spool/herald")
    }

    pub fn digest_state_dir() -> PathBuf {
        PathBuf::from("/var/lib/herald/digests")
    }

    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn idle_ms() -> u64 {
        1000
    }

    pub const fn num_slices() -> usize {
        1
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.queue_root, PathBuf::from("/var/spool/herald"));
        assert_eq!(config.runner.max_retries, 3);
        assert_eq!(config.runner.num_slices, 1);
        assert!(config.nntp.is_none());
        assert!(config.lists.is_empty());
    }

    #[test]
    fn test_full_config_round_trip() {
        let config: Config = toml::from_str(
            r#"
            queue_root = "/tmp/herald/queues"
            digest_state_dir = "/tmp/herald/digests"

            [runner]
            max_retries = 5
            idle_ms = 250
            slice = 1
            num_slices = 4

            [nntp]
            address = "news.example.com:119"
            username = "gateway"
            password = "secret"

            [[list]]
            name = "ant"
            host = "example.com"
            display_name = "Ant"
            linked_newsgroup = "comp.lists.ant"
            digest_threshold_kb = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.runner.slice, 1);
        assert_eq!(config.runner.num_slices, 4);
        assert_eq!(
            config.nntp.as_ref().unwrap().address,
            "news.example.com:119"
        );
        assert_eq!(config.lists.len(), 1);
        assert_eq!(config.lists[0].digest_threshold_kb, 15);

        let settings = config.runner.settings_for("news");
        assert_eq!(settings.queue, "news");
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.idle_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("queue_roott = \"/tmp\"").is_err());
        assert!(
            toml::from_str::<Config>("[runner]\nmax_retriess = 2").is_err()
        );
    }
}
