//! REST client for the job-creation endpoints.
//!
//! Wraps `POST /api/cv/process` (multipart upload returning a job id) and
//! `POST /api/cv/generate` (urlencoded chat generation) using [`reqwest`].
//! Uploads are validated locally first; a rejected file never reaches
//! the network. Failed requests are reported once and never retried.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cvflow_core::types::JobId;
use cvflow_core::upload::{validate_upload, UploadConstraints, UploadError};

const PROCESS_ENDPOINT: &str = "/api/cv/process";
const GENERATE_ENDPOINT: &str = "/api/cv/generate";

/// Multipart field carrying the CV file.
const CV_FILE_FIELD: &str = "cv_file";

/// `status` value of a successful generation.
const STATUS_SUCCESS: &str = "success";

/// HTTP client for the CV backend.
#[derive(Debug, Clone)]
pub struct CvApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response of `POST /api/cv/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GenerateResponse {
    pub status: String,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub pdf_filename: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    job_id: Option<Value>,
}

/// Errors from the job-creation layer.
#[derive(Debug, thiserror::Error)]
pub enum CvApiError {
    /// The file failed local validation; no request was sent.
    #[error(transparent)]
    Validation(#[from] UploadError),

    /// The file could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response with a server-provided message.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Non-2xx response without a usable message.
    #[error("Upload failed (HTTP {status})")]
    UploadFailed { status: u16 },

    /// 2xx response that did not include a job id.
    #[error("Server response did not include a job id")]
    MissingJobId,

    /// The generation endpoint answered with a non-success status.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}

impl CvApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Validate and upload a CV file, returning the job id.
    pub async fn process_cv(
        &self,
        path: &Path,
        constraints: &UploadConstraints,
    ) -> Result<JobId, CvApiError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        let metadata = tokio::fs::metadata(path).await.map_err(|source| CvApiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        validate_upload(&file_name, metadata.len(), constraints)?;

        let bytes = tokio::fs::read(path).await.map_err(|source| CvApiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.upload(&file_name, bytes).await
    }

    /// Validate and upload in-memory file content, returning the job id.
    pub async fn process_cv_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        constraints: &UploadConstraints,
    ) -> Result<JobId, CvApiError> {
        validate_upload(file_name, bytes.len() as u64, constraints)?;
        self.upload(file_name, bytes).await
    }

    /// Ask the backend to generate a CV from a chat prompt.
    ///
    /// Progress for the request is published on the socket keyed by
    /// `session_id`.
    pub async fn generate_cv(
        &self,
        user_input: &str,
        template: &str,
        session_id: &str,
    ) -> Result<GenerateResponse, CvApiError> {
        let url = format!("{}{GENERATE_ENDPOINT}", self.api_url);
        tracing::info!(session_id, template, url = %url, "Requesting CV generation");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("user_input", user_input),
                ("template", template),
                ("session_id", session_id),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let body: GenerateResponse = response.json().await?;
        if body.status != STATUS_SUCCESS {
            let reason = body
                .detail
                .clone()
                .or_else(|| body.message.clone())
                .unwrap_or_else(|| format!("status '{}'", body.status));
            return Err(CvApiError::GenerationFailed(reason));
        }
        Ok(body)
    }

    // ---- private helpers ----

    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<JobId, CvApiError> {
        let url = format!("{}{PROCESS_ENDPOINT}", self.api_url);
        let size = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type(file_name))?;
        let form = Form::new().part(CV_FILE_FIELD, part);

        tracing::info!(file_name, size, url = %url, "Uploading CV");

        let response = self.client.post(&url).multipart(form).send().await?;
        let response = Self::ensure_success(response).await?;
        let body: ProcessResponse = response.json().await?;

        let job_id = match body.job_id {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(CvApiError::MissingJobId),
        };
        tracing::info!(job_id = %job_id, "CV processing job created");
        Ok(job_id)
    }

    /// Pass through 2xx responses; turn anything else into an error that
    /// carries the server's `detail` (or `message`) when there is one.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CvApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %body, "Backend request failed");

        match server_message(&body) {
            Some(message) => Err(CvApiError::Server {
                status: status.as_u16(),
                message,
            }),
            None => Err(CvApiError::UploadFailed {
                status: status.as_u16(),
            }),
        }
    }
}

/// Extract a human-readable message from an error body.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
}

/// MIME type sent with the uploaded file.
fn content_type(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("doc") => "application/msword",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
