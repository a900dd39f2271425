//! Maps job progress to user-facing labels, icons, colors and actions.
//!
//! Read-only: nothing here mutates job state.

use serde::Serialize;

use crate::stage::Stage;

/// Icon token used for stages not in the table.
pub const FALLBACK_ICON: &str = "spinner";

/// Label used for stages not in the table.
pub const FALLBACK_LABEL: &str = "Processing...";

/// `(stage, icon, label)` for every known stage.
static STAGE_TABLE: &[(Stage, &str, &str)] = &[
    (Stage::Initialized, "hourglass", "Initializing..."),
    (Stage::Uploading, "upload", "Uploading CV..."),
    (Stage::Extracting, "search", "Extracting CV data..."),
    (Stage::Deduplicating, "filter", "Removing duplicates..."),
    (Stage::Formatting, "edit", "Formatting content..."),
    (Stage::TemplateSelection, "layout", "Selecting template..."),
    (Stage::Rendering, "palette", "Rendering CV..."),
    (Stage::GeneratingPdf, "file-pdf", "Generating PDF..."),
    (Stage::UploadingCloud, "cloud-upload", "Uploading to cloud..."),
    (Stage::Completed, "check-circle", "Completed"),
    (Stage::Error, "x-circle", "Failed"),
];

/// Result keys that hold a downloadable artifact path.
const DOWNLOAD_KEYS: &[&str] = &["pdf_path", "pdf_url", "download_url", "file_path"];

/// Result keys that hold an externally viewable URL.
const VIEW_KEYS: &[&str] = &["view_url", "online_url", "web_url", "public_url"];

/// Progress bar color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BarColor {
    Green,
    Red,
    Blue,
}

/// A terminal action offered once a job has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultAction {
    Download { path: String },
    ViewOnline { url: String },
}

pub fn stage_icon(stage: &Stage) -> &'static str {
    lookup(stage).map_or(FALLBACK_ICON, |&(_, icon, _)| icon)
}

pub fn stage_label(stage: &Stage) -> &'static str {
    lookup(stage).map_or(FALLBACK_LABEL, |&(_, _, label)| label)
}

fn lookup(stage: &Stage) -> Option<&'static (Stage, &'static str, &'static str)> {
    STAGE_TABLE.iter().find(|(s, _, _)| s == stage)
}

/// Green when completed, red when failed, blue otherwise.
pub fn bar_color(stage: &Stage) -> BarColor {
    match stage {
        Stage::Completed => BarColor::Green,
        Stage::Error => BarColor::Red,
        _ => BarColor::Blue,
    }
}

/// Clamp a raw percentage into `0..=100` for display.
pub fn clamp_percentage(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Collect one action per artifact found in a completion result.
///
/// Only the first non-empty string of each kind is used. A result with no
/// recognised keys yields no actions.
pub fn result_actions(result: &serde_json::Value) -> Vec<ResultAction> {
    let mut actions = Vec::new();
    if let Some(path) = first_string(result, DOWNLOAD_KEYS) {
        actions.push(ResultAction::Download { path });
    }
    if let Some(url) = first_string(result, VIEW_KEYS) {
        actions.push(ResultAction::ViewOnline { url });
    }
    actions
}

fn first_string(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Everything needed to draw one progress bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub stage: Stage,
    pub icon: &'static str,
    pub label: &'static str,
    /// Server message, or the stage label when the server sent none.
    pub message: String,
    pub percentage: u8,
    pub color: BarColor,
    pub actions: Vec<ResultAction>,
}

impl ProgressView {
    /// Build a view. `result` is only consulted when `completed` is true.
    pub fn new(
        stage: &Stage,
        raw_percentage: f64,
        message: &str,
        completed: bool,
        result: Option<&serde_json::Value>,
    ) -> Self {
        // A completion signalled by percentage or download flag renders as completed.
        let display_stage = if completed && !stage.is_terminal() {
            Stage::Completed
        } else {
            stage.clone()
        };
        let label = stage_label(&display_stage);
        let message = if message.trim().is_empty() {
            label.to_string()
        } else {
            message.to_string()
        };
        let actions = match (completed, result) {
            (true, Some(result)) => result_actions(result),
            _ => Vec::new(),
        };

        Self {
            icon: stage_icon(&display_stage),
            label,
            message,
            percentage: clamp_percentage(raw_percentage),
            color: bar_color(&display_stage),
            actions,
            stage: display_stage,
        }
    }
}
