//! Client-side validation for CV uploads.
//!
//! Runs before any network request. A rejected file is reported
//! synchronously and never retried.

use crate::error::CoreError;

/// Default upper bound on upload size, in megabytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// Extensions accepted when the caller does not configure any.
pub const DEFAULT_ACCEPTED_FORMATS: &[&str] = &[".pdf", ".docx", ".doc", ".txt"];

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Size and format limits applied to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConstraints {
    /// Maximum file size in megabytes.
    pub max_file_size_mb: u64,
    /// Accepted extensions, with or without a leading dot.
    pub accepted_formats: Vec<String>,
}

impl Default for UploadConstraints {
    fn default() -> Self {
        Self {
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            accepted_formats: DEFAULT_ACCEPTED_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

impl UploadConstraints {
    /// Build constraints, rejecting a zero size limit or an empty format list.
    pub fn new(max_file_size_mb: u64, accepted_formats: Vec<String>) -> Result<Self, CoreError> {
        if max_file_size_mb == 0 {
            return Err(CoreError::Validation(
                "max_file_size_mb must be greater than zero".to_string(),
            ));
        }
        let accepted_formats: Vec<String> = accepted_formats
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty() && f != ".")
            .collect();
        if accepted_formats.is_empty() {
            return Err(CoreError::Validation(
                "at least one accepted format is required".to_string(),
            ));
        }
        Ok(Self {
            max_file_size_mb,
            accepted_formats,
        })
    }

    /// Size limit in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Case-insensitive suffix match of `file_name` against the accepted list.
    pub fn accepts(&self, file_name: &str) -> bool {
        let name = file_name.to_ascii_lowercase();
        self.accepted_formats.iter().any(|format| {
            let format = format.to_ascii_lowercase();
            let suffix = if format.starts_with('.') {
                format
            } else {
                format!(".{format}")
            };
            name.ends_with(&suffix)
        })
    }
}

/// Reasons an upload is rejected before it is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("File is too large ({size_bytes} bytes). Maximum size is {max_file_size_mb}MB")]
    FileTooLarge {
        size_bytes: u64,
        max_file_size_mb: u64,
    },

    #[error("Unsupported file format for '{file_name}'. Accepted formats: {accepted}")]
    UnsupportedFormat { file_name: String, accepted: String },
}

/// Check a file against the constraints. Size is checked first.
pub fn validate_upload(
    file_name: &str,
    size_bytes: u64,
    constraints: &UploadConstraints,
) -> Result<(), UploadError> {
    if size_bytes > constraints.max_bytes() {
        return Err(UploadError::FileTooLarge {
            size_bytes,
            max_file_size_mb: constraints.max_file_size_mb,
        });
    }
    if !constraints.accepts(file_name) {
        return Err(UploadError::UnsupportedFormat {
            file_name: file_name.to_string(),
            accepted: constraints.accepted_formats.join(", "),
        });
    }
    Ok(())
}
