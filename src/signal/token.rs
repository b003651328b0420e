//! Signal token files
//!
//! `restart-signal` is written by whoever wants a re-validation; its content
//! is opaque. `last-processed-signal` is owned here and holds the content of
//! the last signal acted on. A signal is new iff the two differ byte for byte.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::types::Result;

pub const SIGNAL_FILE: &str = "restart-signal";
pub const PROCESSED_FILE: &str = "last-processed-signal";

/// Opaque signal content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalToken(Vec<u8>);

impl SignalToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SignalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Write `contents` to a sibling temp file, then rename over `path`
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The pair of token files in a signal directory
#[derive(Debug, Clone)]
pub struct SignalFiles {
    dir: PathBuf,
}

impl SignalFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn signal_path(&self) -> PathBuf {
        self.dir.join(SIGNAL_FILE)
    }

    pub fn processed_path(&self) -> PathBuf {
        self.dir.join(PROCESSED_FILE)
    }

    /// Create the signal directory if missing
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Current signal content; `None` when no signal file exists
    pub async fn read_signal(&self) -> Result<Option<SignalToken>> {
        Ok(read_optional(&self.signal_path()).await?.map(SignalToken))
    }

    /// Content of the last processed signal
    pub async fn read_processed(&self) -> Result<Option<SignalToken>> {
        Ok(read_optional(&self.processed_path()).await?.map(SignalToken))
    }

    /// The current signal if it has not been processed yet
    ///
    /// An empty signal file is no signal; it is what a reader sees between
    /// an in-place truncate and the write that follows.
    pub async fn pending_token(&self) -> Result<Option<SignalToken>> {
        let signal = match self.read_signal().await? {
            Some(signal) if !signal.as_bytes().is_empty() => signal,
            _ => return Ok(None),
        };
        let processed = self.read_processed().await?;

        if processed.as_ref() == Some(&signal) {
            Ok(None)
        } else {
            Ok(Some(signal))
        }
    }

    /// Durably record `token` as processed
    pub async fn mark_processed(&self, token: &SignalToken) -> Result<()> {
        write_atomic(&self.processed_path(), token.as_bytes()).await
    }
}
