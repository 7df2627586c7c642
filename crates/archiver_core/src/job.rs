use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque job token, derived from the channel id and the start instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(channel_id: &str, started_at: DateTime<Utc>) -> Self {
        Self(format!("{channel_id}-{}", started_at.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one export run.
///
/// `Fetching` and `Processing` alternate once per batch; every other state is
/// entered at most once, and `Succeeded`/`Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Starting,
    Fetching,
    Processing,
    Rendering,
    MovingAssets,
    Finalizing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal job transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Starting, Fetching)
                | (Fetching, Processing)
                | (Fetching, Rendering)
                | (Processing, Fetching)
                | (Processing, Rendering)
                | (Rendering, MovingAssets)
                | (MovingAssets, Finalizing)
                | (Finalizing, Succeeded)
        )
    }

    /// Checked transition; leaves `self` untouched on error.
    pub fn advance(&mut self, next: JobState) -> Result<(), TransitionError> {
        if !self.can_advance_to(next) {
            return Err(TransitionError { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobState::Starting => "starting",
            JobState::Fetching => "fetching",
            JobState::Processing => "processing",
            JobState::Rendering => "rendering",
            JobState::MovingAssets => "moving-assets",
            JobState::Finalizing => "finalizing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Per-job download counters reported in the success summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCounters {
    /// Completed network downloads.
    pub downloaded: u64,
    /// Lookups answered from the URL cache; known failures are not counted.
    pub cache_hits: u64,
    /// Downloads discarded because identical content was already stored.
    pub content_duplicates: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub channel_name: String,
    pub channel_id: String,
    pub batches: u32,
    pub messages: u64,
    pub duration: Duration,
    pub downloads: DownloadCounters,
    pub stopped_at_batch_limit: bool,
}

impl ExportSummary {
    /// Human-readable text written to the success marker and sent with the
    /// `complete` event.
    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Export of #{} ({}) completed in {}.\nBatches: {}\nMessages: {}\nFiles downloaded: {} (cache hits: {}, duplicate content: {}, failed: {})\n",
            self.channel_name,
            self.channel_id,
            format_duration(self.duration),
            self.batches,
            self.messages,
            self.downloads.downloaded,
            self.downloads.cache_hits,
            self.downloads.content_duplicates,
            self.downloads.failures,
        );
        if self.stopped_at_batch_limit {
            text.push_str("Stopped early at the configured batch limit.\n");
        }
        text
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{}.{:01}s", s, duration.subsec_millis() / 100)
    }
}
