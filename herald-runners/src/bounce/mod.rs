//! Bounce detection.
//!
//! MTAs agree on very little about bounce formats, so detection is a
//! chain of per-format recognizers tried in order; the first one that
//! extracts any addresses wins. A message no recognizer understands is
//! not an error, just an empty result: unrecognized bounces are a fact
//! of life, not a failure.

pub mod dsn;
pub mod postfix;

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{internal, message::Message};
use herald_switchboard::WorkItem;

use crate::{
    error::Result,
    runner::{Behavior, Disposition},
};

/// One bounce format's extraction logic.
pub trait Recognizer: Send + Sync + std::fmt::Debug {
    /// Short name used in results and log lines.
    fn name(&self) -> &'static str;

    /// Try to read `message` as a bounce in this recognizer's format.
    /// `None` when the message is not in this format at all; an empty
    /// `Vec` when it is but names no failed recipients.
    fn attempt(&self, message: &Message) -> Option<Vec<String>>;
}

/// The outcome of running a message through the recognizer chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BounceResult {
    /// Addresses that bounced, in the order the notice listed them.
    pub addresses: Vec<String>,
    /// Which recognizer produced the addresses, when any did.
    pub recognizer: Option<&'static str>,
}

impl BounceResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Ordered chain of [`Recognizer`]s.
#[derive(Debug)]
pub struct BounceDetector {
    recognizers: Vec<Box<dyn Recognizer>>,
}

impl Default for BounceDetector {
    /// The standard chain: RFC 3464 delivery status notifications first,
    /// then the format-specific heuristics.
    fn default() -> Self {
        Self {
            recognizers: vec![
                Box::new(dsn::Dsn::new()),
                Box::new(postfix::Postfix::new()),
            ],
        }
    }
}

impl BounceDetector {
    #[must_use]
    pub fn new(recognizers: Vec<Box<dyn Recognizer>>) -> Self {
        Self { recognizers }
    }

    /// Run the chain. Never fails; a message nobody recognizes yields an
    /// empty result.
    #[must_use]
    pub fn detect(&self, message: &Message) -> BounceResult {
        for recognizer in &self.recognizers {
            if let Some(addresses) = recognizer.attempt(message)
                && !addresses.is_empty()
            {
                return BounceResult {
                    addresses,
                    recognizer: Some(recognizer.name()),
                };
            }
        }
        BounceResult::default()
    }
}

/// [`Behavior`] that runs incoming bounce notices through the detector.
///
/// Score-keeping and membership changes are the list manager's
/// business; this behavior's job is turning an opaque MTA notice into
/// named recipients, and it reports them through the log.
#[derive(Debug)]
pub struct BounceProcessor {
    detector: Arc<BounceDetector>,
}

impl BounceProcessor {
    #[must_use]
    pub fn new(detector: Arc<BounceDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl Behavior for BounceProcessor {
    fn name(&self) -> &'static str {
        "bounce-processor"
    }

    async fn process(&self, item: &mut WorkItem) -> Result<Disposition> {
        let result = self.detector.detect(&item.message);

        if result.is_empty() {
            internal!(level = DEBUG, "Unrecognized bounce, item {}", item.key);
        } else if let Some(recognizer) = result.recognizer {
            internal!(
                level = INFO,
                "Bounce ({recognizer}) for {:?}, item {}",
                result.addresses,
                item.key
            );
        }

        Ok(Disposition::Done)
    }
}
