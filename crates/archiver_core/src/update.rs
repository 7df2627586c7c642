use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Connected,
    Starting,
    Progress,
    Warning,
    Error,
    Complete,
}

impl UpdateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, UpdateStatus::Complete | UpdateStatus::Error)
    }

    /// Server-sent event name this status travels under.
    pub fn event_name(self) -> &'static str {
        match self {
            UpdateStatus::Complete => "complete",
            UpdateStatus::Error => "error",
            UpdateStatus::Connected
            | UpdateStatus::Starting
            | UpdateStatus::Progress
            | UpdateStatus::Warning => "message",
        }
    }
}

/// A status event pushed to every observer of a job. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: UpdateStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl JobUpdate {
    pub fn new(status: UpdateStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            batch: None,
            percent: None,
            summary: None,
        }
    }

    pub fn connected(job_id: &crate::JobId) -> Self {
        Self::new(
            UpdateStatus::Connected,
            format!("Connected to export job {job_id}"),
        )
    }

    pub fn starting(message: impl Into<String>) -> Self {
        Self::new(UpdateStatus::Starting, message).with_percent(0)
    }

    pub fn progress(message: impl Into<String>, batch: u32) -> Self {
        Self::new(UpdateStatus::Progress, message).with_batch(batch)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(UpdateStatus::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(UpdateStatus::Error, message)
    }

    pub fn complete(message: impl Into<String>, summary: impl Into<String>) -> Self {
        let mut update = Self::new(UpdateStatus::Complete, message).with_percent(100);
        update.summary = Some(summary.into());
        update
    }

    pub fn with_batch(mut self, batch: u32) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent.min(100));
        self
    }
}
