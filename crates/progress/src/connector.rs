//! Live progress subscription for one job.
//!
//! [`ProgressSubscription::start`] spawns a single task that owns the
//! [`SubscriptionDriver`] and executes its commands: it opens sockets,
//! forwards frames, arms the reconnect timer and sends pings. All state
//! mutation happens on that task. Observers read through `watch`
//! snapshots, a `broadcast` event stream and a one-shot outcome.
//!
//! Dropping the subscription cancels the task, the socket and every timer.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use cvflow_core::channel::{CLOSE_CODE_NORMAL, PING_INTERVAL};
use cvflow_core::presentation::ProgressView;
use cvflow_core::types::JobId;

use crate::client::ProgressClient;
use crate::driver::{DriverCommand, DriverInput, Epoch, SubscriptionDriver};
use crate::events::{ConnectionState, JobOutcome, ProgressEvent};
use crate::messages::OutboundFrame;
use crate::reconnect::ReconnectPolicy;
use crate::state::ProgressState;

/// Broadcast channel capacity for subscription events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long [`ProgressSubscription::shutdown`] waits for the task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub reconnect: ReconnectPolicy,
    /// Interval between client pings while connected.
    pub ping_interval: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::upload()
    }
}

impl ConnectorConfig {
    /// Settings for jobs created by a file upload.
    pub fn upload() -> Self {
        Self {
            reconnect: ReconnectPolicy::upload(),
            ping_interval: PING_INTERVAL,
        }
    }

    /// Settings for chat-driven generation sessions.
    pub fn chat() -> Self {
        Self {
            reconnect: ReconnectPolicy::chat(),
            ping_interval: PING_INTERVAL,
        }
    }
}

/// Handle to a running subscription.
pub struct ProgressSubscription {
    job_id: JobId,
    state_rx: watch::Receiver<ProgressState>,
    connection_rx: watch::Receiver<ConnectionState>,
    event_tx: broadcast::Sender<ProgressEvent>,
    control_tx: mpsc::UnboundedSender<DriverInput>,
    outcome_rx: Option<oneshot::Receiver<JobOutcome>>,
    outcome: Option<JobOutcome>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ProgressSubscription {
    /// Start following `job_id`. Must be called inside a tokio runtime.
    pub fn start(
        client: ProgressClient,
        job_id: impl Into<JobId>,
        config: ConnectorConfig,
    ) -> Self {
        let job_id = job_id.into();
        let driver = SubscriptionDriver::new(job_id.clone(), config.reconnect.clone());

        let (state_tx, state_rx) = watch::channel(driver.state().clone());
        let (connection_tx, connection_rx) = watch::channel(driver.connection().clone());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let runtime = SubscriptionRuntime {
            client,
            job_id: job_id.clone(),
            ping_interval: config.ping_interval,
            cancel: cancel.clone(),
            input_tx: None,
            link: None,
            reconnect_at: None,
            ping_at: None,
            state_tx,
            connection_tx,
            event_tx: event_tx.clone(),
            outcome_tx: Some(outcome_tx),
        };

        let task_job_id = job_id.clone();
        let task = tokio::spawn(async move {
            tracing::info!(job_id = %task_job_id, "Starting progress subscription");
            runtime.run(driver, control_rx).await;
            tracing::info!(job_id = %task_job_id, "Progress subscription exited");
        });

        Self {
            job_id,
            state_rx,
            connection_rx,
            event_tx,
            control_tx,
            outcome_rx: Some(outcome_rx),
            outcome: None,
            cancel,
            task: Some(task),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Latest progress snapshot.
    pub fn state(&self) -> ProgressState {
        self.state_rx.borrow().clone()
    }

    /// Presentation view of the latest snapshot.
    pub fn view(&self) -> ProgressView {
        self.state_rx.borrow().view()
    }

    /// Receiver that wakes on every progress change.
    pub fn watch_state(&self) -> watch::Receiver<ProgressState> {
        self.state_rx.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection_rx.borrow().clone()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection_rx.clone()
    }

    /// Subscribe to subscription events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    /// Wait for the job to finish. Later calls return the same outcome.
    pub async fn outcome(&mut self) -> JobOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.outcome_rx.take() {
            Some(rx) => rx.await.unwrap_or(JobOutcome::Cancelled),
            None => JobOutcome::Cancelled,
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Reconnect after automatic recovery gave up.
    pub fn retry(&self) {
        if self.control_tx.send(DriverInput::Retry).is_err() {
            tracing::debug!(job_id = %self.job_id, "Retry ignored, subscription already stopped");
        }
    }

    /// Close the socket, cancel timers and wait for the task to exit.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!(job_id = %self.job_id, "Progress subscription did not stop in time");
            }
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Socket task bookkeeping for the current epoch.
struct ConnectionLink {
    epoch: Epoch,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    cancel: CancellationToken,
}

/// Executes driver commands. Lives entirely on the subscription task.
struct SubscriptionRuntime {
    client: ProgressClient,
    job_id: JobId,
    ping_interval: Duration,
    /// Subscription-wide token; every socket task holds a child of it.
    cancel: CancellationToken,
    input_tx: Option<mpsc::UnboundedSender<DriverInput>>,
    link: Option<ConnectionLink>,
    reconnect_at: Option<Instant>,
    ping_at: Option<Instant>,
    state_tx: watch::Sender<ProgressState>,
    connection_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<ProgressEvent>,
    outcome_tx: Option<oneshot::Sender<JobOutcome>>,
}

impl SubscriptionRuntime {
    async fn run(
        mut self,
        mut driver: SubscriptionDriver,
        mut control_rx: mpsc::UnboundedReceiver<DriverInput>,
    ) {
        let cancel = self.cancel.clone();
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        self.input_tx = Some(input_tx);

        let commands = driver.start();
        self.execute(commands);

        loop {
            let input = tokio::select! {
                _ = cancel.cancelled() => DriverInput::Shutdown,
                Some(input) = control_rx.recv() => input,
                Some(input) = input_rx.recv() => input,
                _ = tokio::time::sleep_until(self.reconnect_at.unwrap_or_else(Instant::now)),
                    if self.reconnect_at.is_some() =>
                {
                    self.reconnect_at = None;
                    DriverInput::ReconnectDue
                }
                _ = tokio::time::sleep_until(self.ping_at.unwrap_or_else(Instant::now)),
                    if self.ping_at.is_some() =>
                {
                    self.ping_at = Some(Instant::now() + self.ping_interval);
                    DriverInput::PingDue
                }
            };

            let commands = driver.handle(input);
            self.execute(commands);
            self.publish_snapshots(&driver);

            if driver.is_shut_down() {
                break;
            }
        }
    }

    fn execute(&mut self, commands: Vec<DriverCommand>) {
        for command in commands {
            match command {
                DriverCommand::Connect { epoch } => self.connect(epoch),
                DriverCommand::Send { epoch, frame } => match &self.link {
                    Some(link) if link.epoch == epoch => {
                        if link.outbound.send(frame).is_err() {
                            tracing::debug!(
                                job_id = %self.job_id,
                                epoch,
                                "Socket task gone, frame dropped",
                            );
                        }
                    }
                    _ => tracing::trace!(
                        job_id = %self.job_id,
                        epoch,
                        "No current socket for frame",
                    ),
                },
                DriverCommand::Close { epoch } => {
                    if self.link.as_ref().is_some_and(|link| link.epoch == epoch) {
                        if let Some(link) = self.link.take() {
                            link.cancel.cancel();
                        }
                    }
                }
                DriverCommand::ArmReconnect { delay } => {
                    self.reconnect_at = Some(Instant::now() + delay);
                }
                DriverCommand::CancelReconnect => self.reconnect_at = None,
                DriverCommand::StartPing => {
                    self.ping_at = Some(Instant::now() + self.ping_interval);
                }
                DriverCommand::StopPing => self.ping_at = None,
                DriverCommand::Publish(event) => {
                    // No listeners is fine.
                    let _ = self.event_tx.send(event);
                }
                DriverCommand::Resolve(outcome) => {
                    if let Some(tx) = self.outcome_tx.take() {
                        let _ = tx.send(outcome);
                    }
                }
            }
        }
    }

    /// Replace the current socket with a new one for `epoch`.
    fn connect(&mut self, epoch: Epoch) {
        if let Some(old) = self.link.take() {
            old.cancel.cancel();
        }
        let Some(input_tx) = self.input_tx.clone() else {
            return;
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.child_token();
        self.link = Some(ConnectionLink {
            epoch,
            outbound: outbound_tx,
            cancel: cancel.clone(),
        });

        let client = self.client.clone();
        let job_id = self.job_id.clone();
        tokio::spawn(async move {
            run_connection(client, job_id, epoch, outbound_rx, input_tx, cancel).await;
        });
    }

    fn publish_snapshots(&self, driver: &SubscriptionDriver) {
        self.state_tx.send_if_modified(|state| {
            if state == driver.state() {
                return false;
            }
            *state = driver.state().clone();
            true
        });
        self.connection_tx.send_if_modified(|connection| {
            if connection == driver.connection() {
                return false;
            }
            *connection = driver.connection().clone();
            true
        });
    }
}

/// Drive one socket: report open, forward frames both ways, report close.
///
/// A cancelled link closes with code 1000 and reports nothing, so the
/// driver never mistakes a deliberate close for a dropped connection.
async fn run_connection(
    client: ProgressClient,
    job_id: JobId,
    epoch: Epoch,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inputs: mpsc::UnboundedSender<DriverInput>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        result = client.connect(&job_id) => result,
    };

    let conn = match connected {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(job_id = %job_id, epoch, error = %e, "Progress connection failed");
            let _ = inputs.send(DriverInput::Errored {
                epoch,
                error: e.to_string(),
            });
            let _ = inputs.send(DriverInput::Closed { epoch, code: None });
            return;
        }
    };

    let _ = inputs.send(DriverInput::Opened { epoch });
    let (mut sink, mut stream) = conn.ws_stream.split();

    let code = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let close = CloseFrame {
                    code: CloseCode::from(CLOSE_CODE_NORMAL),
                    reason: "".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(close))).await {
                    tracing::debug!(job_id = %job_id, epoch, error = %e, "Close frame not sent");
                }
                return;
            }
            Some(frame) = outbound.recv() => {
                tracing::trace!(job_id = %job_id, epoch, ?frame, "Sending frame");
                if let Err(e) = sink.send(Message::Text(frame.to_json())).await {
                    let _ = inputs.send(DriverInput::Errored {
                        epoch,
                        error: e.to_string(),
                    });
                    break None;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = inputs.send(DriverInput::Frame { epoch, text });
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Protocol-level ping/pong is handled by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(
                            job_id = %job_id,
                            epoch,
                            ?frame,
                            "Progress socket closed by server",
                        );
                        break frame.map(|f| u16::from(f.code));
                    }
                    Some(Ok(_)) => {
                        // Binary / raw frames carry nothing for us.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            job_id = %job_id,
                            epoch,
                            error = %e,
                            "Progress socket receive error",
                        );
                        let _ = inputs.send(DriverInput::Errored {
                            epoch,
                            error: e.to_string(),
                        });
                        break None;
                    }
                    None => {
                        tracing::info!(job_id = %job_id, epoch, "Progress socket stream exhausted");
                        break None;
                    }
                }
            }
        }
    };

    let _ = sink.close().await;
    let _ = inputs.send(DriverInput::Closed { epoch, code });
}
