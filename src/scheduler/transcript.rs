//! Last-execution transcript
//!
//! A JSON copy of the most recent run report next to the signal files, for
//! consumers that watch the directory rather than the database.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::TriggerCause;
use crate::engine::RunReport;
use crate::signal::token::write_atomic;

pub const TRANSCRIPT_FILE: &str = "last-execution.json";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptEntry<'a> {
    cause: TriggerCause,
    #[serde(flatten)]
    report: &'a RunReport,
}

#[derive(Debug, Clone)]
pub struct RunTranscript {
    path: PathBuf,
}

impl RunTranscript {
    /// Transcript stored as `last-execution.json` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(TRANSCRIPT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate so leftovers of a previous cycle are not mistaken for this one
    pub async fn reset(&self) {
        match write_atomic(&self.path, b"").await {
            Ok(()) => debug!(path = %self.path.display(), "Transcript reset"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to reset transcript"),
        }
    }

    pub async fn write(&self, cause: TriggerCause, report: &RunReport) {
        let body = match serde_json::to_vec_pretty(&TranscriptEntry { cause, report }) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to serialize transcript");
                return;
            }
        };

        if let Err(e) = write_atomic(&self.path, &body).await {
            warn!(path = %self.path.display(), error = %e, "Failed to write transcript");
        }
    }
}
