//! Wire constants for the job progress channel.
//!
//! Inbound frames have the shape `{"type": "<kind>", "data": {...}}`;
//! outbound frames carry only the `type` field.

use std::time::Duration;

/// Path prefix of the per-job progress socket (`/ws/progress/{job_id}`).
pub const PROGRESS_WS_PATH: &str = "/ws/progress";

// ---------------------------------------------------------------------------
// Inbound message types
// ---------------------------------------------------------------------------

/// Stage/percentage update for a running job.
pub const MSG_TYPE_PROGRESS_UPDATE: &str = "progress_update";

/// Job finished successfully; `data.result` carries the artifacts.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed; `data.error` carries the server message.
pub const MSG_TYPE_JOB_ERROR: &str = "job_error";

/// Snapshot of server-side state, sent once right after connect.
pub const MSG_TYPE_INITIAL_STATUS: &str = "initial_status";

/// Peer liveness probe. Must be answered with a pong.
pub const MSG_TYPE_KEEPALIVE: &str = "keepalive";

// ---------------------------------------------------------------------------
// Outbound message types
// ---------------------------------------------------------------------------

/// Reply to a peer keepalive.
pub const MSG_TYPE_PONG: &str = "pong";

/// Client-initiated liveness probe, sent on a fixed interval.
pub const MSG_TYPE_PING: &str = "ping";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Reconnect delay used by the file-upload flow.
pub const UPLOAD_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Reconnect delay used by the chat-driven generation flow.
pub const CHAT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Interval between client pings while connected.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Close code sent on a deliberate client-side close.
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Build the socket path for a job, e.g. `/ws/progress/abc123`.
pub fn progress_path(job_id: &str) -> String {
    format!("{PROGRESS_WS_PATH}/{job_id}")
}
