//! Connection-independent core of a progress subscription.
//!
//! [`SubscriptionDriver`] consumes [`DriverInput`]s (socket callbacks,
//! timer ticks, user actions) and answers with [`DriverCommand`]s for the
//! runtime in [`connector`](crate::connector) to execute. It performs no
//! I/O, so every reconnect and keepalive rule can be tested directly.
//!
//! Every connection attempt gets a new epoch. Inputs carrying an older
//! epoch come from a superseded socket and are dropped.

use std::time::Duration;

use cvflow_core::types::JobId;

use crate::events::{ConnectionState, JobOutcome, ProgressEvent};
use crate::messages::{parse_frame, OutboundFrame};
use crate::reconnect::{CloseDecision, ReconnectPolicy, ReconnectTracker};
use crate::state::{JobProgress, ProgressState, Transition};

/// Identifies one connection attempt.
pub type Epoch = u64;

/// Something that happened to the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverInput {
    Opened { epoch: Epoch },
    Frame { epoch: Epoch, text: String },
    Errored { epoch: Epoch, error: String },
    Closed { epoch: Epoch, code: Option<u16> },
    /// The pending reconnect timer fired.
    ReconnectDue,
    /// The ping interval elapsed.
    PingDue,
    /// The user asked to reconnect after automatic recovery gave up.
    Retry,
    /// Deliberate teardown.
    Shutdown,
}

/// Something the runtime must do.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    /// Open a new socket tagged with `epoch`, replacing any previous one.
    Connect { epoch: Epoch },
    /// Send a frame on the socket of `epoch`, if it is still current.
    Send { epoch: Epoch, frame: OutboundFrame },
    /// Close the socket of `epoch` deliberately.
    Close { epoch: Epoch },
    ArmReconnect { delay: Duration },
    CancelReconnect,
    StartPing,
    StopPing,
    Publish(ProgressEvent),
    /// Deliver the terminal outcome. Emitted at most once.
    Resolve(JobOutcome),
}

/// State and rules for one job subscription.
#[derive(Debug)]
pub struct SubscriptionDriver {
    progress: JobProgress,
    connection: ConnectionState,
    reconnect: ReconnectTracker,
    epoch: Epoch,
    shutting_down: bool,
    resolved: bool,
}

impl SubscriptionDriver {
    pub fn new(job_id: impl Into<JobId>, policy: ReconnectPolicy) -> Self {
        Self {
            progress: JobProgress::new(job_id),
            connection: ConnectionState::default(),
            reconnect: ReconnectTracker::new(policy),
            epoch: 0,
            shutting_down: false,
            resolved: false,
        }
    }

    pub fn job_id(&self) -> &str {
        self.progress.job_id()
    }

    pub fn state(&self) -> &ProgressState {
        self.progress.state()
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    /// Epoch of the current connection attempt.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutting_down
    }

    /// Commands for the first connection.
    pub fn start(&mut self) -> Vec<DriverCommand> {
        vec![self.next_connection()]
    }

    /// Apply one input.
    pub fn handle(&mut self, input: DriverInput) -> Vec<DriverCommand> {
        if self.shutting_down {
            return Vec::new();
        }

        match input {
            DriverInput::Opened { epoch } if self.is_current(epoch) => self.on_opened(),
            DriverInput::Frame { epoch, text } if self.is_current(epoch) => self.on_frame(&text),
            DriverInput::Errored { epoch, error } if self.is_current(epoch) => {
                self.on_errored(error)
            }
            DriverInput::Closed { epoch, code } if self.is_current(epoch) => self.on_closed(code),
            DriverInput::Opened { epoch }
            | DriverInput::Frame { epoch, .. }
            | DriverInput::Errored { epoch, .. }
            | DriverInput::Closed { epoch, .. } => {
                tracing::trace!(
                    job_id = %self.job_id(),
                    epoch,
                    current = self.epoch,
                    "Dropping input from superseded connection",
                );
                Vec::new()
            }
            DriverInput::ReconnectDue => self.on_reconnect_due(),
            DriverInput::PingDue => self.on_ping_due(),
            DriverInput::Retry => self.on_retry(),
            DriverInput::Shutdown => self.on_shutdown(),
        }
    }

    // ---- private helpers ----

    fn is_current(&self, epoch: Epoch) -> bool {
        epoch == self.epoch
    }

    fn next_connection(&mut self) -> DriverCommand {
        self.epoch += 1;
        tracing::debug!(
            job_id = %self.job_id(),
            epoch = self.epoch,
            "Opening progress connection",
        );
        DriverCommand::Connect { epoch: self.epoch }
    }

    fn on_opened(&mut self) -> Vec<DriverCommand> {
        self.connection.connected = true;
        self.connection.last_error = None;
        self.connection.retry_available = false;
        self.reconnect.on_open();

        vec![
            DriverCommand::StartPing,
            DriverCommand::Publish(ProgressEvent::Connected {
                job_id: self.job_id().to_string(),
            }),
        ]
    }

    fn on_frame(&mut self, text: &str) -> Vec<DriverCommand> {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    job_id = %self.job_id(),
                    error = %e,
                    raw = %text,
                    "Discarding malformed frame",
                );
                return Vec::new();
            }
        };

        let job_id = self.job_id().to_string();
        match self.progress.apply(&frame) {
            Transition::Updated => vec![self.progress_event()],
            Transition::Completed(result) => {
                self.reconnect.cancel();
                let mut commands = vec![
                    self.progress_event(),
                    DriverCommand::Publish(ProgressEvent::Completed {
                        job_id,
                        result: result.clone(),
                    }),
                ];
                commands.extend(self.resolve(JobOutcome::Completed(result)));
                commands
            }
            Transition::Failed(error) => {
                self.reconnect.cancel();
                let mut commands = vec![
                    self.progress_event(),
                    DriverCommand::Publish(ProgressEvent::Failed {
                        job_id,
                        error: error.clone(),
                    }),
                ];
                commands.extend(self.resolve(JobOutcome::Failed(error)));
                commands
            }
            Transition::Keepalive => vec![DriverCommand::Send {
                epoch: self.epoch,
                frame: OutboundFrame::Pong,
            }],
            Transition::Ignored(_) => Vec::new(),
        }
    }

    fn on_errored(&mut self, error: String) -> Vec<DriverCommand> {
        tracing::warn!(
            job_id = %self.job_id(),
            epoch = self.epoch,
            error = %error,
            "Progress connection error",
        );
        let was_connected = std::mem::replace(&mut self.connection.connected, false);
        self.connection.last_error = Some(error.clone());

        let mut commands = vec![DriverCommand::StopPing];
        if was_connected {
            commands.push(DriverCommand::Publish(ProgressEvent::Disconnected {
                job_id: self.job_id().to_string(),
                error: Some(error),
            }));
        }
        commands
    }

    fn on_closed(&mut self, code: Option<u16>) -> Vec<DriverCommand> {
        let was_connected = std::mem::replace(&mut self.connection.connected, false);
        let mut commands = vec![DriverCommand::StopPing];
        if was_connected {
            commands.push(DriverCommand::Publish(ProgressEvent::Disconnected {
                job_id: self.job_id().to_string(),
                error: self.connection.last_error.clone(),
            }));
        }

        match self.reconnect.on_close(self.progress.is_terminal(), false) {
            CloseDecision::Schedule(delay) => {
                tracing::info!(
                    job_id = %self.job_id(),
                    ?code,
                    delay_ms = delay.as_millis() as u64,
                    "Progress connection closed, scheduling reconnect",
                );
                self.connection.reconnect_pending = true;
                commands.push(DriverCommand::ArmReconnect { delay });
            }
            CloseDecision::AlreadyPending => {
                tracing::debug!(job_id = %self.job_id(), "Reconnect already pending");
            }
            CloseDecision::NotNeeded => {
                tracing::debug!(
                    job_id = %self.job_id(),
                    ?code,
                    "Progress connection closed after terminal state",
                );
            }
            CloseDecision::Exhausted => {
                tracing::warn!(job_id = %self.job_id(), "Reconnect failed, manual retry required");
                self.connection.retry_available = true;
                commands.push(DriverCommand::Publish(ProgressEvent::RetryAvailable {
                    job_id: self.job_id().to_string(),
                }));
            }
        }
        commands
    }

    fn on_reconnect_due(&mut self) -> Vec<DriverCommand> {
        if !self.reconnect.on_fire() {
            return Vec::new();
        }
        self.connection.reconnect_pending = false;
        if self.progress.is_terminal() {
            return Vec::new();
        }
        tracing::info!(job_id = %self.job_id(), "Reconnecting to progress channel");
        vec![self.next_connection()]
    }

    fn on_ping_due(&mut self) -> Vec<DriverCommand> {
        if !self.connection.connected {
            return Vec::new();
        }
        vec![DriverCommand::Send {
            epoch: self.epoch,
            frame: OutboundFrame::Ping,
        }]
    }

    fn on_retry(&mut self) -> Vec<DriverCommand> {
        if self.progress.is_terminal() || self.connection.connected {
            return Vec::new();
        }
        tracing::info!(job_id = %self.job_id(), "Manual retry requested");
        let mut commands = Vec::new();
        if self.reconnect.is_pending() {
            commands.push(DriverCommand::CancelReconnect);
        }
        self.reconnect.reset();
        self.connection.reconnect_pending = false;
        self.connection.retry_available = false;
        commands.push(self.next_connection());
        commands
    }

    fn on_shutdown(&mut self) -> Vec<DriverCommand> {
        tracing::debug!(job_id = %self.job_id(), "Tearing down progress subscription");
        self.shutting_down = true;
        self.reconnect.cancel();
        self.connection.connected = false;
        self.connection.reconnect_pending = false;

        let mut commands = vec![
            DriverCommand::CancelReconnect,
            DriverCommand::StopPing,
            DriverCommand::Close { epoch: self.epoch },
        ];
        commands.extend(self.resolve(JobOutcome::Cancelled));
        commands
    }

    fn progress_event(&self) -> DriverCommand {
        DriverCommand::Publish(ProgressEvent::Progress {
            job_id: self.job_id().to_string(),
            state: self.state().clone(),
        })
    }

    fn resolve(&mut self, outcome: JobOutcome) -> Option<DriverCommand> {
        if std::mem::replace(&mut self.resolved, true) {
            return None;
        }
        Some(DriverCommand::Resolve(outcome))
    }
}
