//! The news gateway: forwards list posts to a linked newsgroup.
//!
//! Processing is two phases. Preparation rewrites the message into a
//! well-formed news article (newsgroup merge, Message-ID policy, header
//! hygiene) and records a `prepared` flag in the item's metadata, so a
//! requeued item is never prepared twice. Posting hands the article to
//! the news server; every posting failure is transient and lands the
//! item back in the queue within its retry budget.

pub mod client;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use herald_common::{
    internal,
    list::{ListConfig, ListRegistry},
    message::Message,
    metadata::{Value, flag, keys},
};
use herald_switchboard::WorkItem;
use regex::Regex;

use crate::{
    error::{BehaviorError, Result},
    nntp::client::NntpClient,
    runner::{Behavior, Disposition},
};

/// Every Message-ID this system mints matches this shape, so a
/// previously gated article is recognized and its ID kept.
const MESSAGE_ID_PATTERN: &str = r"^<herald\.\d+\.\d+\.\d+\.(?P<list>[^@]+)@(?P<host>[^>]+)>$";

/// Connection settings for the upstream news server.
#[derive(Debug, Clone)]
pub struct NntpServer {
    /// `host:port` of the news server.
    pub address: String,
    /// `AUTHINFO` credentials, when the server requires them.
    pub username: Option<String>,
    pub password: Option<String>,
}

/// [`Behavior`] that gates list traffic to Usenet.
#[derive(Debug)]
pub struct NewsGateway {
    registry: Arc<ListRegistry>,
    server: NntpServer,
    message_id: Regex,
    serial: AtomicU64,
}

impl NewsGateway {
    /// # Panics
    /// Never; the Message-ID pattern is a compile-time constant.
    #[must_use]
    #[allow(clippy::missing_panics_doc, clippy::unwrap_used)]
    pub fn new(registry: Arc<ListRegistry>, server: NntpServer) -> Self {
        Self {
            registry,
            server,
            message_id: Regex::new(MESSAGE_ID_PATTERN).unwrap(),
            serial: AtomicU64::new(0),
        }
    }

    /// Whether `id` was minted by this system for this list and host.
    fn owns_message_id(&self, id: &str, config: &ListConfig) -> bool {
        self.message_id.captures(id.trim()).is_some_and(|caps| {
            caps.name("list").is_some_and(|m| m.as_str() == config.name)
                && caps.name("host").is_some_and(|m| m.as_str() == config.host)
        })
    }

    /// Mint a fresh Message-ID: a process-local serial, the wall clock,
    /// and the pid keep it unique; the list and host make it
    /// recognizable on the way back.
    fn generate_message_id(&self, config: &ListConfig) -> String {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        let secs = chrono::Utc::now().timestamp();
        let pid = std::process::id();
        format!("<herald.{serial}.{secs}.{pid}.{}@{}>", config.name, config.host)
    }

    /// Rewrite a list post into a news article.
    fn prepare(&self, message: &mut Message, config: &ListConfig, newsgroup: &str) {
        // Merge the linked group into any crossposting already present.
        let mut groups: Vec<String> = message
            .get("newsgroups")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|group| !group.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if !groups.iter().any(|group| group == newsgroup) {
            groups.push(newsgroup.to_string());
        }
        message.set("Newsgroups", &groups.join(", "));

        // Keep an ID we minted for this list, replace anything else: news
        // servers reject duplicate IDs, and a foreign ID may have been
        // seen on the wire already.
        let keep = message
            .get("message-id")
            .is_some_and(|id| self.owns_message_id(id, config));
        if !keep {
            let id = self.generate_message_id(config);
            message.set("Message-ID", &id);
        }

        if message.get("lines").is_none() {
            let lines = message.body_line_count();
            message.set("Lines", &lines.to_string());
        }

        for header in &config.nntp_remove_headers {
            message.remove(header);
        }

        // Some servers refuse articles with duplicated headers; keep the
        // first occurrence and move the rest aside under a new name.
        for rule in &config.nntp_rewrite_duplicate_headers {
            let values: Vec<String> = message
                .get_all(&rule.header)
                .iter()
                .map(|value| (*value).to_string())
                .collect();
            if values.len() > 1 {
                message.remove(&rule.header);
                message.append(&rule.header, &values[0]);
                for value in &values[1..] {
                    message.append(&rule.rewrite, value);
                }
            }
        }
    }

    async fn post(&self, article: &[u8]) -> Result<()> {
        let mut client = NntpClient::connect(&self.server.address).await?;
        if let Some(username) = &self.server.username {
            let password = self.server.password.as_deref().unwrap_or_default();
            client.authenticate(username, password).await?;
        }
        client.post(article).await?;
        client.quit().await;
        Ok(())
    }
}

#[async_trait]
impl Behavior for NewsGateway {
    fn name(&self) -> &'static str {
        "news-gateway"
    }

    async fn process(&self, item: &mut WorkItem) -> Result<Disposition> {
        let list_name = item
            .metadata
            .get(keys::LIST)
            .and_then(Value::as_str)
            .ok_or_else(|| BehaviorError::Config("Item carries no list name".to_string()))?
            .to_string();

        let config = self
            .registry
            .get(&list_name)
            .ok_or_else(|| BehaviorError::Config(format!("Unknown list: {list_name}")))?;

        // Lists without a linked group have nothing to gate.
        let Some(newsgroup) = config.linked_newsgroup.clone() else {
            internal!(
                level = DEBUG,
                "List {list_name} is not gated to news, discarding item {}",
                item.key
            );
            return Ok(Disposition::Done);
        };

        if !flag(&item.metadata, keys::PREPARED) {
            self.prepare(&mut item.message, &config, &newsgroup);
            item.metadata
                .insert(keys::PREPARED.to_string(), Value::Bool(true));
        }

        // Any posting failure is worth another try later; the prepared
        // flag rides along with the requeued item.
        self.post(&item.message.to_bytes()).await?;

        internal!(
            level = INFO,
            "Posted item {} for list {list_name} to {newsgroup}",
            item.key
        );

        Ok(Disposition::Done)
    }
}
