//! Signal watcher
//!
//! Detects "re-validate now" requests written to the signal directory.
//! Prefers inotify on the directory; degrades to a fixed-interval poll when
//! notification cannot be set up or the watch thread dies. Either way a
//! window without events fires a scheduled trigger, and a signal token is
//! acted on at most once.

pub mod inotify;
pub mod token;

pub use token::{SignalFiles, SignalToken, PROCESSED_FILE, SIGNAL_FILE};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::scheduler::TriggerCause;
use crate::shutdown::Shutdown;
use self::inotify::WatchEvent;

/// Receiver of watcher triggers
pub trait TriggerSink: Send + Sync {
    /// Must return promptly; long work belongs on a spawned task
    fn fire(&self, cause: TriggerCause);
}

/// Watcher timing
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// Window without events after which a scheduled trigger fires
    pub poll_interval: Duration,
    /// Sleep between checks in polling mode
    pub fallback_poll_interval: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3600),
            fallback_poll_interval: Duration::from_secs(30),
        }
    }
}

pub struct SignalWatcher {
    files: SignalFiles,
    settings: WatcherSettings,
    sink: Arc<dyn TriggerSink>,
    shutdown: Shutdown,
}

impl SignalWatcher {
    pub fn new(
        files: SignalFiles,
        settings: WatcherSettings,
        sink: Arc<dyn TriggerSink>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            files,
            settings,
            sink,
            shutdown,
        }
    }

    /// Fire `cause` if the signal file holds an unprocessed token
    ///
    /// The token is recorded as processed after the sink is invoked. Read and
    /// write errors are logged and treated as no signal.
    pub async fn check_signal(&self, cause: TriggerCause) -> bool {
        let token = match self.files.pending_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Failed to read restart signal");
                return false;
            }
        };

        info!(cause = %cause, token = %token, "New restart signal");
        self.sink.fire(cause);

        if let Err(e) = self.files.mark_processed(&token).await {
            warn!(error = %e, "Failed to record processed signal");
        }
        true
    }

    /// Watch until shutdown
    pub async fn run(self) {
        if let Err(e) = self.files.ensure_dir().await {
            warn!(dir = %self.files.dir().display(), error = %e, "Failed to create signal directory");
        }

        let (tx, rx) = mpsc::channel(1);
        match inotify::spawn_watch_thread(self.files.dir(), SIGNAL_FILE, tx) {
            Ok(_handle) => {
                info!(dir = %self.files.dir().display(), "Watching for restart signals");
                if !self.run_notified(rx).await {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "Filesystem notification unavailable, polling");
            }
        }

        self.run_polling().await;
    }

    /// Event-driven loop; `true` when the watch thread died and polling should take over
    async fn run_notified(&self, mut rx: mpsc::Receiver<WatchEvent>) -> bool {
        let mut shutdown = self.shutdown.clone();
        self.check_signal(TriggerCause::FileWatch).await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    debug!("Signal watcher stopping");
                    return false;
                }
                waited = tokio::time::timeout(self.settings.poll_interval, rx.recv()) => {
                    match waited {
                        Ok(Some(WatchEvent::Changed)) => {
                            self.check_signal(TriggerCause::FileWatch).await;
                        }
                        Ok(Some(WatchEvent::Unavailable(reason))) => {
                            warn!(reason = %reason, "Signal watch lost, switching to polling");
                            return true;
                        }
                        Ok(None) => {
                            warn!("Signal watch thread exited, switching to polling");
                            return true;
                        }
                        Err(_) => {
                            debug!("No signal within poll interval");
                            self.sink.fire(TriggerCause::Scheduled);
                        }
                    }
                }
            }
        }
    }

    /// Fixed-interval loop with the same novelty rule
    async fn run_polling(&self) {
        let mut shutdown = self.shutdown.clone();
        let mut last_scheduled = Instant::now();

        info!(
            interval_secs = self.settings.fallback_poll_interval.as_secs(),
            "Polling for restart signals"
        );

        loop {
            self.check_signal(TriggerCause::PollingSignal).await;

            if last_scheduled.elapsed() >= self.settings.poll_interval {
                self.sink.fire(TriggerCause::Scheduled);
                last_scheduled = Instant::now();
            }

            if !shutdown.sleep(self.settings.fallback_poll_interval).await {
                debug!("Signal watcher stopping");
                return;
            }
        }
    }

    /// Polling loop regardless of notification support
    pub async fn run_polling_only(self) {
        if let Err(e) = self.files.ensure_dir().await {
            warn!(error = %e, "Failed to create signal directory");
        }
        self.run_polling().await;
    }
}
