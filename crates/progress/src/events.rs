//! Events and snapshots published by a progress subscription.

use serde::Serialize;
use serde_json::Value;

use crate::state::ProgressState;

/// Connection status of a subscription. Independent of job progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub last_error: Option<String>,
    /// A single reconnect attempt is scheduled.
    pub reconnect_pending: bool,
    /// Automatic reconnection gave up; the caller may call `retry()`.
    pub retry_available: bool,
}

/// A subscription-level event, broadcast to all listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The socket for the current connection opened.
    Connected { job_id: String },

    /// The socket closed or errored.
    Disconnected {
        job_id: String,
        error: Option<String>,
    },

    /// A new progress snapshot was applied.
    Progress {
        job_id: String,
        state: ProgressState,
    },

    /// The job completed. Sent once.
    Completed { job_id: String, result: Value },

    /// The job failed. Sent once.
    Failed { job_id: String, error: String },

    /// The automatic reconnect failed; a manual retry is needed.
    RetryAvailable { job_id: String },
}

/// Terminal result of a job, delivered exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Failed(String),
    /// The subscription was torn down before the job finished.
    Cancelled,
}
