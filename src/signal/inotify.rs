//! Filesystem notification for the signal directory
//!
//! inotify is read on a dedicated OS thread; each relevant event becomes a
//! wake message on a tokio channel. Other platforms report the watcher as
//! unavailable so the caller falls back to polling.

use std::path::Path;

use tokio::sync::mpsc;

use crate::types::{Result, ValidatorError};

/// Message from the watch thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The signal file was closed after writing or moved into place
    Changed,
    /// The watch thread stopped; events may have been lost
    Unavailable(String),
}

#[cfg(target_os = "linux")]
pub fn spawn_watch_thread(
    dir: &Path,
    file_name: &str,
    tx: mpsc::Sender<WatchEvent>,
) -> Result<std::thread::JoinHandle<()>> {
    use mpsc::error::TrySendError;
    use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};

    // Completed writes only; a truncate-then-write must not wake on the truncate
    let watch_mask = AddWatchFlags::IN_CLOSE_WRITE | AddWatchFlags::IN_MOVED_TO;

    let inotify = Inotify::init(InitFlags::IN_CLOEXEC)
        .map_err(|error| ValidatorError::Signal(format!("inotify init failed: {error}")))?;
    inotify
        .add_watch(dir, watch_mask)
        .map_err(|error| ValidatorError::Signal(format!("inotify add watch failed: {error}")))?;

    let file_name = std::ffi::OsString::from(file_name);

    std::thread::Builder::new()
        .name("signal-watch".to_string())
        .spawn(move || {
            let inotify = inotify;

            loop {
                let events = match inotify.read_events() {
                    Ok(events) => events,
                    Err(error) => {
                        let _ = tx.blocking_send(WatchEvent::Unavailable(format!(
                            "inotify read failed: {error}"
                        )));
                        return;
                    }
                };

                let mut changed = false;
                for event in events {
                    if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
                        let _ = tx.blocking_send(WatchEvent::Unavailable(
                            "inotify queue overflow (events may be lost)".to_string(),
                        ));
                        return;
                    }
                    if event.name.as_deref() == Some(file_name.as_os_str()) {
                        changed = true;
                    }
                }

                if changed {
                    match tx.try_send(WatchEvent::Changed) {
                        // A wake is already queued; the reader re-reads the file anyway
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => return,
                    }
                }
            }
        })
        .map_err(|error| ValidatorError::Signal(format!("failed to spawn watch thread: {error}")))
}

#[cfg(not(target_os = "linux"))]
pub fn spawn_watch_thread(
    _dir: &Path,
    _file_name: &str,
    _tx: mpsc::Sender<WatchEvent>,
) -> Result<std::thread::JoinHandle<()>> {
    Err(ValidatorError::Signal(
        "filesystem notification unavailable on this platform".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_cannot_be_watched() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);

        let err = spawn_watch_thread(&dir.path().join("absent"), "restart-signal", tx).unwrap_err();
        assert!(matches!(err, ValidatorError::Signal(_)));
    }
}
