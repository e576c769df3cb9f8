//! Per-list configuration and the registry the runners consult.
//!
//! Lists are declared in the TOML configuration; every entry is validated
//! when it is inserted into the registry, so a bad header rule or an empty
//! host name is an error at load time, not at use time.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while validating a list configuration.
#[derive(Debug, Error)]
pub enum ListConfigError {
    #[error("List name must not be empty")]
    EmptyName,

    #[error("List {0}: host name must not be empty")]
    EmptyHost(String),

    #[error("List {0}: header rewrite rule has an empty header name")]
    EmptyRewriteRule(String),

    #[error("List {0} is already registered")]
    Duplicate(String),
}

/// A keep-first/rewrite-rest rule for headers that must not appear
/// duplicated in news posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRewrite {
    /// Header that may only occur once.
    pub header: String,
    /// Header name the surplus occurrences are moved under.
    pub rewrite: String,
}

/// Configuration of one mailing list, as consumed by the runners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// Internal name, the local part of the posting address.
    pub name: String,

    /// Host name of the list's domain.
    pub host: String,

    /// Human-readable name used in digest subjects and mastheads.
    /// Defaults to the internal name.
    #[serde(default)]
    pub display_name: String,

    /// Short description shown in the digest masthead.
    #[serde(default)]
    pub description: String,

    /// Newsgroup this list is gated to, if any.
    #[serde(default)]
    pub linked_newsgroup: Option<String>,

    /// Digest emission threshold, in kilobytes of accumulated posts.
    /// Zero emits a digest on every post.
    #[serde(default = "defaults::digest_threshold_kb")]
    pub digest_threshold_kb: u64,

    /// Preferred character set for the flat (RFC 1153) digest.
    #[serde(default = "defaults::preferred_charset")]
    pub preferred_charset: String,

    /// Current digest volume. Advancing it is list policy, not ours.
    #[serde(default = "defaults::volume")]
    pub digest_volume: u64,

    /// Headers stripped before news posting.
    #[serde(default = "defaults::nntp_remove_headers")]
    pub nntp_remove_headers: Vec<String>,

    /// Duplicate-header rules applied before news posting.
    #[serde(default = "defaults::nntp_rewrite_duplicate_headers")]
    pub nntp_rewrite_duplicate_headers: Vec<HeaderRewrite>,
}

mod defaults {
    use super::HeaderRewrite;

    pub const fn digest_threshold_kb() -> u64 {
        30
    }

    pub fn preferred_charset() -> String {
        "utf-8".to_string()
    }

    pub const fn volume() -> u64 {
        1
    }

    pub fn nntp_remove_headers() -> Vec<String> {
        [
            "nntp-posting-host",
            "nntp-posting-date",
            "x-trace",
            "x-complaints-to",
            "xref",
            "date-received",
            "posted",
            "posting-version",
            "relay-version",
            "received",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    pub fn nntp_rewrite_duplicate_headers() -> Vec<HeaderRewrite> {
        [
            ("To", "X-Original-To"),
            ("Cc", "X-Original-Cc"),
            ("Content-Transfer-Encoding", "X-Original-Content-Transfer-Encoding"),
            ("MIME-Version", "X-MIME-Version"),
        ]
        .into_iter()
        .map(|(header, rewrite)| HeaderRewrite {
            header: header.to_string(),
            rewrite: rewrite.to_string(),
        })
        .collect()
    }
}

impl ListConfig {
    /// A minimal list configuration with defaults, mainly for tests.
    #[must_use]
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            display_name: String::new(),
            description: String::new(),
            linked_newsgroup: None,
            digest_threshold_kb: defaults::digest_threshold_kb(),
            preferred_charset: defaults::preferred_charset(),
            digest_volume: defaults::volume(),
            nntp_remove_headers: defaults::nntp_remove_headers(),
            nntp_rewrite_duplicate_headers: defaults::nntp_rewrite_duplicate_headers(),
        }
    }

    /// Validate the entry; called by the registry on insert.
    ///
    /// # Errors
    /// If a required field is empty or a header rule is malformed.
    pub fn validate(&self) -> Result<(), ListConfigError> {
        if self.name.is_empty() {
            return Err(ListConfigError::EmptyName);
        }
        if self.host.is_empty() {
            return Err(ListConfigError::EmptyHost(self.name.clone()));
        }
        for rule in &self.nntp_rewrite_duplicate_headers {
            if rule.header.is_empty() || rule.rewrite.is_empty() {
                return Err(ListConfigError::EmptyRewriteRule(self.name.clone()));
            }
        }
        Ok(())
    }

    /// The list's posting address, `name@host`.
    #[must_use]
    pub fn posting_address(&self) -> String {
        format!("{}@{}", self.name, self.host)
    }

    /// The administrative request address, `name-request@host`.
    #[must_use]
    pub fn request_address(&self) -> String {
        format!("{}-request@{}", self.name, self.host)
    }

    /// Display name for human-facing text, falling back to the
    /// internal name when none was configured.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// Registry of configured lists, keyed by internal name.
#[derive(Debug, Default)]
pub struct ListRegistry {
    lists: DashMap<String, Arc<ListConfig>>,
}

impl ListRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a list.
    ///
    /// # Errors
    /// If validation fails or the name is already registered.
    pub fn insert(&self, config: ListConfig) -> Result<(), ListConfigError> {
        config.validate()?;
        if self.lists.contains_key(&config.name) {
            return Err(ListConfigError::Duplicate(config.name));
        }
        self.lists.insert(config.name.clone(), Arc::new(config));
        Ok(())
    }

    /// Look up a list by internal name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ListConfig>> {
        self.lists.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
