//! The generic queue runner.
//!
//! A runner owns one queue and one behavior. Each scan pass snapshots
//! the queue, claims the keys in its slice one at a time, and dispatches
//! every claimed item to the behavior. The behavior's verdict decides
//! the item's fate: commit, requeue with a bumped retry count, or
//! quarantine. Shutdown is honored between items, never in the middle of
//! a dispatch, so an in-flight item always reaches one of the three
//! terminal store operations.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use herald_common::{Signal, internal};
use herald_switchboard::{Store, SwitchboardError, WorkItem, slice};
use tokio::sync::broadcast;

use crate::error::Result;

/// A behavior's verdict on one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished; delete the item.
    Done,
    /// Transient failure; requeue within the retry budget.
    Retry,
    /// Unrecoverable; quarantine the item as-is.
    Shunt,
}

/// One queue's processing logic, injected into a [`Runner`].
#[async_trait]
pub trait Behavior: Send + Sync + Debug {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Process one claimed item. The item is mutable so a behavior can
    /// update its metadata before a requeue.
    ///
    /// # Errors
    /// Errors never abort the runner: transient ones count against the
    /// item's retry budget, permanent ones shunt it.
    async fn process(&self, item: &mut WorkItem) -> Result<Disposition>;
}

/// Runner configuration for one queue.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// The queue this runner drains.
    pub queue: String,
    /// This runner's slice of the keyspace.
    pub slice: usize,
    /// Total number of slices the queue is partitioned into.
    pub num_slices: usize,
    /// Failures tolerated before an item is shunted. An item is shunted
    /// on its `max_retries + 1`th failure.
    pub max_retries: u32,
    /// Sleep between scans of an empty queue.
    pub idle_interval: Duration,
}

impl RunnerSettings {
    #[must_use]
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            slice: 0,
            num_slices: 1,
            max_retries: 3,
            idle_interval: Duration::from_secs(1),
        }
    }
}

/// What one scan pass accomplished.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutcome {
    /// Items dispatched to the behavior.
    pub processed: usize,
    /// True when shutdown arrived mid-scan and the pass stopped early.
    pub interrupted: bool,
}

/// Drains one switchboard queue through a [`Behavior`].
#[derive(Debug)]
pub struct Runner {
    store: Arc<dyn Store>,
    behavior: Box<dyn Behavior>,
    settings: RunnerSettings,
}

impl Runner {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, behavior: Box<dyn Behavior>, settings: RunnerSettings) -> Self {
        Self {
            store,
            behavior,
            settings,
        }
    }

    /// Run until shutdown: recover orphaned claims, then alternate scan
    /// passes with idle sleeps.
    ///
    /// # Errors
    /// Only startup recovery can fail the runner; scan errors are logged
    /// and the next pass retried.
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> std::result::Result<(), SwitchboardError> {
        let restored = self.store.recover(&self.settings.queue).await?;
        internal!(
            level = INFO,
            "Runner {} serving queue {} (slice {}/{}, {} claims recovered)",
            self.behavior.name(),
            self.settings.queue,
            self.settings.slice,
            self.settings.num_slices,
            restored
        );

        let mut tick = tokio::time::interval(self.settings.idle_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tick.tick() => {
                    match self.scan(Some(&mut shutdown)).await {
                        Ok(outcome) if outcome.interrupted => break,
                        Ok(_) => {}
                        Err(err) => {
                            internal!(
                                level = ERROR,
                                "Runner {} scan of {} failed: {err}",
                                self.behavior.name(),
                                self.settings.queue
                            );
                        }
                    }
                }
            }
        }

        internal!(
            level = INFO,
            "Runner {} for queue {} shut down",
            self.behavior.name(),
            self.settings.queue
        );

        Ok(())
    }

    /// One pass over the queue: claim and dispatch every item in this
    /// runner's slice.
    ///
    /// # Errors
    /// If listing the queue or committing an item's fate fails.
    pub async fn scan(
        &self,
        mut shutdown: Option<&mut broadcast::Receiver<Signal>>,
    ) -> std::result::Result<ScanOutcome, SwitchboardError> {
        let keys = self.store.list_keys(&self.settings.queue).await?;
        let mut outcome = ScanOutcome::default();

        for key in keys {
            if let Some(rx) = shutdown.as_deref_mut()
                && rx.try_recv().is_ok()
            {
                outcome.interrupted = true;
                return Ok(outcome);
            }

            if !slice::in_slice(&key, self.settings.slice, self.settings.num_slices) {
                continue;
            }

            let mut item = match self.store.claim_and_read(&self.settings.queue, &key).await {
                Ok(item) => item,
                // Another slice's runner, or a concurrent pass, got there first.
                Err(err) if err.is_claim_race() => continue,
                Err(SwitchboardError::Malformed { key, reason }) => {
                    internal!(
                        level = WARN,
                        "Shunting undecodable item {key} from {}: {reason}",
                        self.settings.queue
                    );
                    self.store.shunt_raw(&self.settings.queue, &key).await?;
                    continue;
                }
                Err(err) => return Err(err),
            };

            self.dispatch(&mut item).await?;
            outcome.processed += 1;
        }

        Ok(outcome)
    }

    /// Route one claimed item to its fate based on the behavior's verdict.
    async fn dispatch(&self, item: &mut WorkItem) -> std::result::Result<(), SwitchboardError> {
        let verdict = self.behavior.process(item).await;

        match verdict {
            Ok(Disposition::Done) => self.store.delete(&item.queue, &item.key).await,
            Ok(Disposition::Shunt) => {
                internal!(
                    level = WARN,
                    "Runner {} shunting item {}",
                    self.behavior.name(),
                    item.key
                );
                self.store.shunt_raw(&item.queue, &item.key).await
            }
            Ok(Disposition::Retry) => self.retry_or_shunt(item).await,
            Err(err) if err.is_transient() => {
                internal!(
                    level = WARN,
                    "Runner {} failed on item {}: {err}",
                    self.behavior.name(),
                    item.key
                );
                self.retry_or_shunt(item).await
            }
            Err(err) => {
                internal!(
                    level = ERROR,
                    "Runner {} cannot process item {}: {err}",
                    self.behavior.name(),
                    item.key
                );
                self.store.shunt_raw(&item.queue, &item.key).await
            }
        }
    }

    async fn retry_or_shunt(&self, item: &mut WorkItem) -> std::result::Result<(), SwitchboardError> {
        if item.retry_count >= self.settings.max_retries {
            internal!(
                level = WARN,
                "Item {} exhausted its {} retries, shunting",
                item.key,
                self.settings.max_retries
            );
            self.store.shunt_raw(&item.queue, &item.key).await
        } else {
            item.retry_count += 1;
            self.store.requeue(item).await
        }
    }
}
