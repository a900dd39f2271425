//! WebSocket client for the job progress channel.
//!
//! [`ProgressClient`] holds the base URL of the backend. Call
//! [`ProgressClient::connect`] to open a live [`ProgressConnection`] for
//! one job. The socket scheme follows the base URL: `http` becomes `ws`
//! and `https` becomes `wss`.

use reqwest::Url;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use cvflow_core::channel::progress_path;

/// Raw socket type returned by tokio-tungstenite.
pub type ProgressStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the progress channel of one backend.
#[derive(Debug, Clone)]
pub struct ProgressClient {
    base_url: String,
}

/// A live WebSocket connection for one job.
pub struct ProgressConnection {
    pub job_id: String,
    /// Fully derived socket URL, e.g. `wss://host/ws/progress/abc123`.
    pub url: String,
    pub ws_stream: ProgressStream,
}

impl ProgressClient {
    /// * `base_url` - backend URL the page is served from, e.g. `https://host`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Socket URL for a job on this backend.
    pub fn ws_url(&self, job_id: &str) -> Result<String, ClientError> {
        progress_ws_url(&self.base_url, job_id)
    }

    /// Open the progress socket for `job_id`.
    pub async fn connect(&self, job_id: &str) -> Result<ProgressConnection, ClientError> {
        let url = self.ws_url(job_id)?;

        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to progress channel at {url}: {e}"))
        })?;

        tracing::info!(job_id, url = %url, "Connected to progress channel");

        Ok(ProgressConnection {
            job_id: job_id.to_string(),
            url,
            ws_stream,
        })
    }
}

/// Derive the progress socket URL for `job_id` from an HTTP(S) base URL.
///
/// `http` maps to `ws`, `https` to `wss`; `ws`/`wss` bases are kept. Any
/// path on the base is preserved as a prefix. Query and fragment are dropped.
pub fn progress_ws_url(base_url: &str, job_id: &str) -> Result<String, ClientError> {
    if job_id.trim().is_empty() {
        return Err(ClientError::InvalidUrl("job id must not be empty".into()));
    }

    let mut url = Url::parse(base_url)
        .map_err(|e| ClientError::InvalidUrl(format!("'{base_url}': {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{other}' in '{base_url}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::InvalidUrl(format!("cannot use scheme {scheme}")))?;

    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}{}", progress_path(job_id)));
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}

/// Errors that can occur when working with the progress socket.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The base URL or job id cannot form a socket URL.
    #[error("Invalid progress URL: {0}")]
    InvalidUrl(String),

    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
