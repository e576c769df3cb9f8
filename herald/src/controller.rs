//! Daemon lifecycle: build the shared state, spawn one runner per
//! queue, and fan a shutdown signal out to all of them.

use std::sync::Arc;

use herald_common::{Signal, internal, list::ListRegistry, logging};
use herald_runners::{
    Runner,
    bounce::{BounceDetector, BounceProcessor},
    digest::DigestBatcher,
    nntp::NewsGateway,
    runner::Behavior,
};
use herald_switchboard::{FileStore, Store, queues};
use tokio::{sync::broadcast, task::JoinSet};

use crate::config::Config;

/// The assembled daemon.
pub struct Herald {
    config: Config,
}

impl Herald {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until SIGINT or SIGTERM.
    ///
    /// # Errors
    /// If the configuration is invalid or the queue root unusable.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let registry = Arc::new(ListRegistry::new());
        for list in self.config.lists {
            registry.insert(list)?;
        }
        internal!("Serving {} lists", registry.len());

        let store: Arc<dyn Store> = Arc::new(FileStore::new(self.config.queue_root)?);

        let (shutdown, _) = broadcast::channel::<Signal>(64);
        let mut tasks = JoinSet::new();

        let mut spawn = |behavior: Box<dyn Behavior>, queue: &str| {
            let runner = Runner::new(
                Arc::clone(&store),
                behavior,
                self.config.runner.settings_for(queue),
            );
            let receiver = shutdown.subscribe();
            tasks.spawn(async move { runner.serve(receiver).await });
        };

        if let Some(nntp) = self.config.nntp {
            spawn(
                Box::new(NewsGateway::new(Arc::clone(&registry), nntp.into())),
                queues::NEWS,
            );
        } else {
            internal!("No news server configured, the news queue is not served");
        }

        spawn(
            Box::new(DigestBatcher::new(
                self.config.digest_state_dir,
                Arc::clone(&registry),
                Arc::clone(&store),
            )?),
            queues::DIGEST,
        );

        spawn(
            Box::new(BounceProcessor::new(Arc::new(BounceDetector::default()))),
            queues::BOUNCE,
        );

        let sender = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = wait_for_signal().await {
                internal!(level = ERROR, "Signal handler failed: {err}");
            }
            let _ = sender.send(Signal::Shutdown);
        });

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => internal!(level = ERROR, "Runner failed: {err}"),
                Err(err) => internal!(level = ERROR, "Runner task panicked: {err}"),
            }
        }

        internal!("Shutting down...");

        Ok(())
    }
}

async fn wait_for_signal() -> std::io::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate signal received, shutting down");
        }
    }

    Ok(())
}
