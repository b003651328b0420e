//! Signal watcher integration tests
//!
//! Drives a real watcher over a temporary signal directory. Signals are
//! written the way producers are expected to write them (temp file, then
//! rename), so a reader never sees a half-written token. The assertions hold
//! in both notification and polling mode.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use lab_validator::scheduler::TriggerCause;
use lab_validator::shutdown::{self, ShutdownTrigger};
use lab_validator::signal::{
    SignalFiles, SignalWatcher, TriggerSink, WatcherSettings, PROCESSED_FILE, SIGNAL_FILE,
};

#[derive(Default)]
struct RecordingSink {
    fired: Mutex<Vec<TriggerCause>>,
}

impl RecordingSink {
    fn signal_count(&self) -> usize {
        self.fired.lock().unwrap().iter().filter(|c| c.is_signal()).count()
    }

    fn causes(&self) -> Vec<TriggerCause> {
        self.fired.lock().unwrap().clone()
    }
}

impl TriggerSink for RecordingSink {
    fn fire(&self, cause: TriggerCause) {
        self.fired.lock().unwrap().push(cause);
    }
}

struct Harness {
    dir: TempDir,
    sink: Arc<RecordingSink>,
    trigger: ShutdownTrigger,
    task: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start(settings: WatcherSettings, polling_only: bool) -> Self {
        Self::start_in(TempDir::new().unwrap(), settings, polling_only)
    }

    fn start_in(dir: TempDir, settings: WatcherSettings, polling_only: bool) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let (trigger, listener) = shutdown::channel();
        let watcher = SignalWatcher::new(
            SignalFiles::new(dir.path()),
            settings,
            sink.clone(),
            listener,
        );
        let task = if polling_only {
            tokio::spawn(watcher.run_polling_only())
        } else {
            tokio::spawn(watcher.run())
        };
        Self {
            dir,
            sink,
            trigger,
            task,
        }
    }

    async fn stop(self) {
        self.trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("watcher should stop promptly")
            .unwrap();
    }
}

fn fast_settings() -> WatcherSettings {
    WatcherSettings {
        poll_interval: Duration::from_secs(60),
        fallback_poll_interval: Duration::from_millis(25),
    }
}

fn write_signal(dir: &Path, content: &str) {
    let tmp = dir.join("restart-signal.partial");
    std::fs::write(&tmp, content).unwrap();
    std::fs::rename(&tmp, dir.join(SIGNAL_FILE)).unwrap();
}

/// Truncate then write through one open handle, the way a shell redirect does
async fn write_signal_in_place(dir: &Path, content: &str) {
    use std::io::Write;

    let mut file = std::fs::File::create(dir.join(SIGNAL_FILE)).unwrap();
    // Leave the truncated file visible long enough for a poll to see it
    tokio::time::sleep(Duration::from_millis(60)).await;
    file.write_all(content.as_bytes()).unwrap();
}

fn processed(dir: &Path) -> Option<String> {
    std::fs::read_to_string(dir.join(PROCESSED_FILE)).ok()
}

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// =============================================================================
// Novelty
// =============================================================================

#[tokio::test]
async fn test_each_new_signal_fires_once() {
    let h = Harness::start(fast_settings(), false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.sink.signal_count(), 0);

    write_signal(h.dir.path(), "1");
    assert!(eventually(|| processed(h.dir.path()).as_deref() == Some("1")).await);
    assert_eq!(h.sink.signal_count(), 1);

    // Same content again is a no-op
    write_signal(h.dir.path(), "1");
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(h.sink.signal_count(), 1);

    write_signal(h.dir.path(), "2");
    assert!(eventually(|| processed(h.dir.path()).as_deref() == Some("2")).await);
    assert_eq!(h.sink.signal_count(), 2);

    h.stop().await;
}

async fn assert_in_place_writes_fire_once_each(polling_only: bool) {
    let h = Harness::start(fast_settings(), polling_only);
    tokio::time::sleep(Duration::from_millis(100)).await;

    write_signal_in_place(h.dir.path(), "1").await;
    assert!(eventually(|| processed(h.dir.path()).as_deref() == Some("1")).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.sink.signal_count(), 1);

    // Rewriting the same content passes through an empty file and back
    write_signal_in_place(h.dir.path(), "1").await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(h.sink.signal_count(), 1);
    assert_eq!(processed(h.dir.path()).as_deref(), Some("1"));

    write_signal_in_place(h.dir.path(), "2").await;
    assert!(eventually(|| processed(h.dir.path()).as_deref() == Some("2")).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.sink.signal_count(), 2);

    h.stop().await;
}

#[tokio::test]
async fn test_in_place_writes_fire_once_each() {
    assert_in_place_writes_fire_once_each(false).await;
}

#[tokio::test]
async fn test_in_place_writes_fire_once_each_when_polling() {
    assert_in_place_writes_fire_once_each(true).await;
}

#[tokio::test]
async fn test_already_processed_signal_is_ignored_at_startup() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(SIGNAL_FILE), "7").unwrap();
    std::fs::write(dir.path().join(PROCESSED_FILE), "7").unwrap();

    let h = Harness::start_in(dir, fast_settings(), false);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(h.sink.signal_count(), 0);

    h.stop().await;
}

#[tokio::test]
async fn test_unprocessed_signal_fires_at_startup() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(SIGNAL_FILE), "8").unwrap();

    let h = Harness::start_in(dir, fast_settings(), false);
    assert!(eventually(|| h.sink.signal_count() == 1).await);
    assert_eq!(processed(h.dir.path()).as_deref(), Some("8"));

    h.stop().await;
}

#[tokio::test]
async fn test_missing_directory_is_created() {
    let root = TempDir::new().unwrap();
    let nested = root.path().join("signals");
    let sink = Arc::new(RecordingSink::default());
    let (trigger, listener) = shutdown::channel();
    let watcher = SignalWatcher::new(SignalFiles::new(&nested), fast_settings(), sink, listener);
    let task = tokio::spawn(watcher.run());

    assert!(eventually(|| nested.is_dir()).await);

    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

// =============================================================================
// Polling fallback and scheduled triggers
// =============================================================================

#[tokio::test]
async fn test_polling_fallback_detects_signal() {
    let h = Harness::start(fast_settings(), true);

    write_signal(h.dir.path(), "poll-1");
    assert!(eventually(|| h.sink.signal_count() == 1).await);
    assert_eq!(h.sink.causes(), vec![TriggerCause::PollingSignal]);

    write_signal(h.dir.path(), "poll-1");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.sink.signal_count(), 1);

    h.stop().await;
}

#[tokio::test]
async fn test_quiet_window_fires_scheduled_trigger() {
    let settings = WatcherSettings {
        poll_interval: Duration::from_millis(100),
        fallback_poll_interval: Duration::from_millis(25),
    };
    let h = Harness::start(settings, false);

    assert!(eventually(|| h.sink.causes().contains(&TriggerCause::Scheduled)).await);
    // No token involved
    assert_eq!(h.sink.signal_count(), 0);
    assert!(processed(h.dir.path()).is_none());

    h.stop().await;
}

#[tokio::test]
async fn test_polling_mode_fires_scheduled_trigger() {
    let settings = WatcherSettings {
        poll_interval: Duration::from_millis(100),
        fallback_poll_interval: Duration::from_millis(25),
    };
    let h = Harness::start(settings, true);

    assert!(eventually(|| h.sink.causes().contains(&TriggerCause::Scheduled)).await);

    h.stop().await;
}
