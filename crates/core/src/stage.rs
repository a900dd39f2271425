//! Processing stages reported by the server.
//!
//! The server owns the stage sequence; the client never enforces an
//! ordering. Unknown tokens are preserved in [`Stage::Other`] so they can
//! still be rendered with a generic label.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const STAGE_INITIALIZED: &str = "initialized";
pub const STAGE_UPLOADING: &str = "uploading";
pub const STAGE_EXTRACTING: &str = "extracting";
pub const STAGE_DEDUPLICATING: &str = "deduplicating";
pub const STAGE_FORMATTING: &str = "formatting";
pub const STAGE_TEMPLATE_SELECTION: &str = "template_selection";
pub const STAGE_RENDERING: &str = "rendering";
pub const STAGE_GENERATING_PDF: &str = "generating_pdf";
pub const STAGE_UPLOADING_CLOUD: &str = "uploading_cloud";
pub const STAGE_COMPLETED: &str = "completed";
pub const STAGE_ERROR: &str = "error";

/// A named step in a job's processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stage {
    #[default]
    Initialized,
    Uploading,
    Extracting,
    Deduplicating,
    Formatting,
    TemplateSelection,
    Rendering,
    GeneratingPdf,
    UploadingCloud,
    Completed,
    Error,
    /// A token not in the known table, kept verbatim.
    Other(String),
}

impl Stage {
    /// The wire token for this stage.
    pub fn as_str(&self) -> &str {
        match self {
            Stage::Initialized => STAGE_INITIALIZED,
            Stage::Uploading => STAGE_UPLOADING,
            Stage::Extracting => STAGE_EXTRACTING,
            Stage::Deduplicating => STAGE_DEDUPLICATING,
            Stage::Formatting => STAGE_FORMATTING,
            Stage::TemplateSelection => STAGE_TEMPLATE_SELECTION,
            Stage::Rendering => STAGE_RENDERING,
            Stage::GeneratingPdf => STAGE_GENERATING_PDF,
            Stage::UploadingCloud => STAGE_UPLOADING_CLOUD,
            Stage::Completed => STAGE_COMPLETED,
            Stage::Error => STAGE_ERROR,
            Stage::Other(token) => token,
        }
    }

    /// `completed` and `error` end a job; nothing after them is applied.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Stage::Other(_))
    }
}

impl From<&str> for Stage {
    fn from(token: &str) -> Self {
        match token {
            STAGE_INITIALIZED => Stage::Initialized,
            STAGE_UPLOADING => Stage::Uploading,
            STAGE_EXTRACTING => Stage::Extracting,
            STAGE_DEDUPLICATING => Stage::Deduplicating,
            STAGE_FORMATTING => Stage::Formatting,
            STAGE_TEMPLATE_SELECTION => Stage::TemplateSelection,
            STAGE_RENDERING => Stage::Rendering,
            STAGE_GENERATING_PDF => Stage::GeneratingPdf,
            STAGE_UPLOADING_CLOUD => Stage::UploadingCloud,
            STAGE_COMPLETED => Stage::Completed,
            STAGE_ERROR => Stage::Error,
            other => Stage::Other(other.to_string()),
        }
    }
}

impl From<String> for Stage {
    fn from(token: String) -> Self {
        Stage::from(token.as_str())
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Other(token) => token,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
