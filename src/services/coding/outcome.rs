//! Stage Outcomes
//!
//! Every pipeline entry point returns a value of its declared shape together
//! with how it was obtained and any one-line notices for the user.

use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// How a stage arrived at its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// The provider answered but nothing usable came back
    Empty,
    /// Upstream input was empty, so the provider was not called
    Skipped,
    /// A configuration or transport failure; the value is the empty default
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Configuration,
    Transport,
}

/// User-visible, one-line notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNotice {
    pub kind: NoticeKind,
    pub message: String,
}

impl StageNotice {
    pub fn from_error(stage: &str, err: &AppError) -> Self {
        let kind = if err.is_configuration() {
            NoticeKind::Configuration
        } else {
            NoticeKind::Transport
        };
        Self {
            kind,
            message: format!("{}: {}", stage, err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome<T> {
    pub value: T,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<StageNotice>,
}

impl<T> StageOutcome<T> {
    pub fn completed(value: T) -> Self {
        Self {
            value,
            status: StageStatus::Completed,
            notices: Vec::new(),
        }
    }

    pub fn empty(value: T) -> Self {
        Self {
            value,
            status: StageStatus::Empty,
            notices: Vec::new(),
        }
    }

    pub fn skipped(value: T) -> Self {
        Self {
            value,
            status: StageStatus::Skipped,
            notices: Vec::new(),
        }
    }

    pub fn degraded(value: T, notice: StageNotice) -> Self {
        Self {
            value,
            status: StageStatus::Degraded,
            notices: vec![notice],
        }
    }

    /// Completed or empty depending on `is_empty`.
    pub fn from_answer(value: T, is_empty: bool) -> Self {
        if is_empty {
            Self::empty(value)
        } else {
            Self::completed(value)
        }
    }

    pub fn with_notices(mut self, notices: Vec<StageNotice>) -> Self {
        self.notices.extend(notices);
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.status == StageStatus::Degraded
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        StageOutcome {
            value: f(self.value),
            status: self.status,
            notices: self.notices,
        }
    }
}

impl<T: Default> StageOutcome<T> {
    /// Empty default value with a notice describing `err`.
    pub fn failed(stage: &str, err: &AppError) -> Self {
        Self::degraded(T::default(), StageNotice::from_error(stage, err))
    }
}

/// Per-stage record of a driver run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
}

/// What happened across a multi-stage driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub stages: Vec<StageReport>,
    pub notices: Vec<StageNotice>,
    /// Set when a terminal condition stopped the run early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
}

impl PipelineReport {
    /// Record `outcome` under `stage` and hand back its value.
    pub fn record<T>(&mut self, stage: &str, outcome: StageOutcome<T>) -> T {
        self.stages.push(StageReport {
            stage: stage.to_string(),
            status: outcome.status,
        });
        self.notices.extend(outcome.notices);
        outcome.value
    }

    pub fn stop(&mut self, stage: &str) {
        self.stopped_at = Some(stage.to_string());
    }

    pub fn status_of(&self, stage: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .rev()
            .find(|s| s.stage == stage)
            .map(|s| s.status)
    }

    pub fn is_degraded(&self) -> bool {
        self.stages.iter().any(|s| s.status == StageStatus::Degraded)
    }
}
