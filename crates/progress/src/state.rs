//! Per-job progress state machine.
//!
//! Holds the latest [`ProgressState`] for one job. Updates fully replace
//! the state (latest wins). Once the job is completed or failed the state
//! is latched: every later frame is ignored.

use serde::Serialize;
use serde_json::{Map, Value};

use cvflow_core::presentation::{clamp_percentage, ProgressView};
use cvflow_core::stage::Stage;
use cvflow_core::types::{JobId, Timestamp};

use crate::messages::{InboundFrame, ProgressData};

/// Metadata key that may carry the job result inside a progress update.
const METADATA_RESULT_KEY: &str = "result";

/// Snapshot of one job's progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressState {
    pub stage: Stage,
    /// Raw percentage as received. Use
    /// [`clamped_percentage`](Self::clamped_percentage) for display.
    pub percentage: f64,
    pub message: String,
    pub metadata: Map<String, Value>,
    /// Timestamp reported by the server, verbatim.
    pub server_timestamp: Option<String>,
    /// When this client last applied a change.
    pub updated_at: Timestamp,
    /// Result payload from `job_completed`.
    pub result: Option<Value>,
    /// Failure message from `job_error`.
    pub error: Option<String>,
    pub download_ready: bool,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            stage: Stage::Initialized,
            percentage: 0.0,
            message: String::new(),
            metadata: Map::new(),
            server_timestamp: None,
            updated_at: chrono::Utc::now(),
            result: None,
            error: None,
            download_ready: false,
        }
    }
}

impl ProgressState {
    fn from_data(data: &ProgressData) -> Self {
        Self {
            stage: data.stage.clone(),
            percentage: data.percentage,
            message: data.message.clone(),
            metadata: data.metadata.clone(),
            server_timestamp: data.timestamp.clone(),
            updated_at: chrono::Utc::now(),
            result: None,
            error: None,
            download_ready: data.download_ready,
        }
    }

    /// Percentage clamped into `0..=100`.
    pub fn clamped_percentage(&self) -> u8 {
        clamp_percentage(self.percentage)
    }

    /// Completed by stage, by reaching 100%, or by the download flag.
    pub fn is_completed(&self) -> bool {
        self.stage == Stage::Completed || self.percentage >= 100.0 || self.download_ready
    }

    pub fn is_failed(&self) -> bool {
        self.stage == Stage::Error || self.error.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.is_completed() || self.is_failed()
    }

    /// The completion result, falling back to `metadata.result`.
    pub fn result(&self) -> Option<&Value> {
        self.result
            .as_ref()
            .or_else(|| self.metadata.get(METADATA_RESULT_KEY))
    }

    /// Presentation view of this state.
    pub fn view(&self) -> ProgressView {
        let message = match (&self.error, self.is_failed()) {
            (Some(error), true) => error.as_str(),
            _ => self.message.as_str(),
        };
        ProgressView::new(
            &self.stage,
            self.percentage,
            message,
            self.is_completed() && !self.is_failed(),
            self.result(),
        )
    }
}

/// Why a frame did not change the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The job already completed or failed.
    Terminal,
    /// The frame kind carries no state.
    UnknownKind(String),
}

/// Outcome of applying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// State replaced; job still running.
    Updated,
    /// Job reached completion. Produced at most once per job.
    Completed(Value),
    /// Job failed. Produced at most once per job.
    Failed(String),
    /// Keepalive; no state change, a pong is owed.
    Keepalive,
    Ignored(IgnoreReason),
}

/// The state machine for a single job.
#[derive(Debug, Clone)]
pub struct JobProgress {
    job_id: JobId,
    state: ProgressState,
}

impl JobProgress {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            state: ProgressState::default(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply one decoded frame.
    pub fn apply(&mut self, frame: &InboundFrame) -> Transition {
        if let InboundFrame::Keepalive = frame {
            return Transition::Keepalive;
        }
        if self.is_terminal() {
            tracing::debug!(
                job_id = %self.job_id,
                kind = frame.kind(),
                "Ignoring frame after terminal state",
            );
            return Transition::Ignored(IgnoreReason::Terminal);
        }

        match frame {
            InboundFrame::ProgressUpdate(data) | InboundFrame::InitialStatus(data) => {
                self.replace(data)
            }
            InboundFrame::JobCompleted(data) => {
                let mut metadata = self.state.metadata.clone();
                metadata.insert(METADATA_RESULT_KEY.to_string(), data.result.clone());
                self.state = ProgressState {
                    stage: Stage::Completed,
                    percentage: 100.0,
                    message: self.state.message.clone(),
                    metadata,
                    server_timestamp: self.state.server_timestamp.clone(),
                    updated_at: chrono::Utc::now(),
                    result: Some(data.result.clone()),
                    error: None,
                    download_ready: self.state.download_ready,
                };
                tracing::info!(job_id = %self.job_id, "Job completed");
                Transition::Completed(data.result.clone())
            }
            InboundFrame::JobError(data) => {
                self.state.stage = Stage::Error;
                self.state.error = Some(data.error.clone());
                self.state.updated_at = chrono::Utc::now();
                tracing::warn!(job_id = %self.job_id, error = %data.error, "Job failed");
                Transition::Failed(data.error.clone())
            }
            InboundFrame::Unknown { kind } => {
                tracing::debug!(job_id = %self.job_id, kind = %kind, "Unknown frame type");
                Transition::Ignored(IgnoreReason::UnknownKind(kind.clone()))
            }
            InboundFrame::Keepalive => Transition::Keepalive,
        }
    }

    fn replace(&mut self, data: &ProgressData) -> Transition {
        self.state = ProgressState::from_data(data);
        tracing::debug!(
            job_id = %self.job_id,
            stage = %self.state.stage,
            percentage = self.state.percentage,
            "Progress updated",
        );
        if !self.state.stage.is_known() {
            tracing::debug!(job_id = %self.job_id, stage = %self.state.stage, "Unrecognised stage");
        }

        if self.state.stage == Stage::Error {
            let error = if self.state.message.is_empty() {
                "Processing failed".to_string()
            } else {
                self.state.message.clone()
            };
            self.state.error = Some(error.clone());
            return Transition::Failed(error);
        }
        if self.state.is_completed() {
            let result = self.state.result().cloned().unwrap_or(Value::Null);
            return Transition::Completed(result);
        }
        Transition::Updated
    }
}
