//! Sync progress models

use serde::{Deserialize, Serialize};

/// Status carried by a progress frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// First frame of a session, sent before any work is done
    Start,
    Running,
    Complete,
    Error,
}

impl ProgressStatus {
    /// Terminal statuses end the progress session
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Complete | ProgressStatus::Error)
    }
}

/// One frame received on the sync progress channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,

    #[serde(default)]
    pub message: String,

    /// Percentage, clamped to 0..=100 on receipt
    #[serde(default)]
    pub progress: i64,
}

impl ProgressEvent {
    pub fn new(status: ProgressStatus, message: impl Into<String>, progress: i64) -> Self {
        Self {
            status,
            message: message.into(),
            progress,
        }
    }

    pub fn percent(&self) -> u8 {
        self.progress.clamp(0, 100) as u8
    }
}

/// Phase shown by the progress indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    /// No sync has been started in this view
    #[default]
    Idle,
    Running,
    Complete,
    Error,
}

/// Consumer-visible progress of the current (or last) sync
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub phase: ProgressPhase,
    pub message: String,
    pub progress: u8,

    /// Loading flag, cleared by a terminal event or a broken channel
    pub in_progress: bool,
}

impl ProgressRecord {
    /// Record shown between opening the channel and the first frame
    pub fn preparing() -> Self {
        Self {
            phase: ProgressPhase::Running,
            message: "Preparing sync...".to_string(),
            progress: 0,
            in_progress: true,
        }
    }

    /// Fold an inbound event into the record.
    ///
    /// Progress never moves backwards within a session; a lower value keeps
    /// the current percentage but still takes the new status and message.
    pub fn apply(&mut self, event: &ProgressEvent) {
        self.phase = match event.status {
            ProgressStatus::Start | ProgressStatus::Running => ProgressPhase::Running,
            ProgressStatus::Complete => ProgressPhase::Complete,
            ProgressStatus::Error => ProgressPhase::Error,
        };
        self.message = event.message.clone();
        self.progress = self.progress.max(event.percent());
        if event.status == ProgressStatus::Complete {
            self.progress = 100;
        }
        self.in_progress = !event.status.is_terminal();
    }

    /// The channel itself broke before a terminal frame
    pub fn fail_connection(&mut self, message: impl Into<String>) {
        self.phase = ProgressPhase::Error;
        self.message = message.into();
        self.in_progress = false;
    }
}
