//! Progress channel message types and parser.
//!
//! The server sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.
//! [`parse_frame`] validates the envelope and the payload of every known
//! kind, so the rest of the crate only ever sees a typed [`InboundFrame`].
//! Unknown kinds decode to [`InboundFrame::Unknown`] instead of failing.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use cvflow_core::channel::{
    MSG_TYPE_INITIAL_STATUS, MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_ERROR, MSG_TYPE_KEEPALIVE,
    MSG_TYPE_PING, MSG_TYPE_PONG, MSG_TYPE_PROGRESS_UPDATE,
};
use cvflow_core::stage::Stage;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Stage update for a running job.
    ProgressUpdate(ProgressData),

    /// Server-side state replayed on first connect. Same effect as an update.
    InitialStatus(ProgressData),

    /// The job finished successfully.
    JobCompleted(CompletedData),

    /// The job failed.
    JobError(ErrorData),

    /// Peer liveness probe; answered with a pong.
    Keepalive,

    /// A well-formed frame with a `type` this client does not know.
    Unknown { kind: String },
}

impl InboundFrame {
    /// The wire `type` of this frame.
    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::ProgressUpdate(_) => MSG_TYPE_PROGRESS_UPDATE,
            InboundFrame::InitialStatus(_) => MSG_TYPE_INITIAL_STATUS,
            InboundFrame::JobCompleted(_) => MSG_TYPE_JOB_COMPLETED,
            InboundFrame::JobError(_) => MSG_TYPE_JOB_ERROR,
            InboundFrame::Keepalive => MSG_TYPE_KEEPALIVE,
            InboundFrame::Unknown { kind } => kind,
        }
    }
}

/// Payload for `progress_update` and `initial_status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressData {
    pub stage: Stage,
    /// Raw percentage as sent; may fall outside `0..=100`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub percentage: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// Open key-value map (template, counts, result URLs).
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Alternate completion signal used by the generation flow.
    #[serde(default, deserialize_with = "null_as_default")]
    pub download_ready: bool,
}

/// Optional fields may arrive as an explicit `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Payload for `job_completed`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletedData {
    #[serde(default)]
    pub result: Value,
}

/// Payload for `job_error`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorData {
    pub error: String,
}

/// Client-to-server frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Ping,
    Pong,
}

impl OutboundFrame {
    /// JSON text for the frame.
    pub fn to_json(self) -> String {
        match self {
            OutboundFrame::Ping => serde_json::json!({ "type": MSG_TYPE_PING }).to_string(),
            OutboundFrame::Pong => serde_json::json!({ "type": MSG_TYPE_PONG }).to_string(),
        }
    }
}

/// Why a frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not JSON, or missing the `type` discriminator.
    #[error("Malformed frame: {0}")]
    Envelope(#[source] serde_json::Error),

    /// Known `type` with a `data` payload of the wrong shape.
    #[error("Invalid '{kind}' payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Parse a progress channel text frame into a typed [`InboundFrame`].
///
/// Returns `Err` for malformed JSON or a malformed payload of a known
/// kind. Callers should log the error and keep the connection open.
pub fn parse_frame(text: &str) -> Result<InboundFrame, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Envelope)?;

    let frame = match envelope.kind.as_str() {
        MSG_TYPE_PROGRESS_UPDATE => InboundFrame::ProgressUpdate(payload(&envelope)?),
        MSG_TYPE_INITIAL_STATUS => InboundFrame::InitialStatus(payload(&envelope)?),
        MSG_TYPE_JOB_COMPLETED => InboundFrame::JobCompleted(payload(&envelope)?),
        MSG_TYPE_JOB_ERROR => InboundFrame::JobError(payload(&envelope)?),
        MSG_TYPE_KEEPALIVE => InboundFrame::Keepalive,
        _ => InboundFrame::Unknown {
            kind: envelope.kind,
        },
    };
    Ok(frame)
}

fn payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, DecodeError> {
    // A missing `data` is treated as an empty object so defaulted fields apply.
    let data = match &envelope.data {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        kind: envelope.kind.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_progress_update() {
        let json = r#"{"type":"progress_update","data":{"stage":"extracting","percentage":40,"message":"Extracting CV data..."}}"#;
        let frame = parse_frame(json).unwrap();
        assert_matches!(frame, InboundFrame::ProgressUpdate(data) => {
            assert_eq!(data.stage, Stage::Extracting);
            assert_eq!(data.percentage, 40.0);
            assert_eq!(data.message, "Extracting CV data...");
            assert!(data.metadata.is_empty());
            assert!(!data.download_ready);
        });
    }

    #[test]
    fn parse_initial_status_with_metadata() {
        let json = r#"{"type":"initial_status","data":{"stage":"rendering","percentage":75.5,"message":"Rendering","metadata":{"template":"modern","count":3},"timestamp":"2026-01-01T10:00:00"}}"#;
        let frame = parse_frame(json).unwrap();
        assert_matches!(frame, InboundFrame::InitialStatus(data) => {
            assert_eq!(data.stage, Stage::Rendering);
            assert_eq!(data.percentage, 75.5);
            assert_eq!(data.metadata["template"], "modern");
            assert_eq!(data.timestamp.as_deref(), Some("2026-01-01T10:00:00"));
        });
    }

    #[test]
    fn parse_null_optional_fields_as_defaults() {
        let json = r#"{"type":"progress_update","data":{"stage":"extracting","percentage":null,"message":null,"metadata":null,"timestamp":null,"download_ready":null}}"#;
        let frame = parse_frame(json).unwrap();
        assert_matches!(frame, InboundFrame::ProgressUpdate(data) => {
            assert_eq!(data.stage, Stage::Extracting);
            assert_eq!(data.percentage, 0.0);
            assert_eq!(data.message, "");
            assert!(data.metadata.is_empty());
            assert_eq!(data.timestamp, None);
            assert!(!data.download_ready);
        });

        let json = r#"{"type":"progress_update","data":{"stage":"extracting","percentage":40,"message":"Extracting CV data...","metadata":null}}"#;
        assert_matches!(parse_frame(json), Ok(InboundFrame::ProgressUpdate(data)) => {
            assert_eq!(data.percentage, 40.0);
            assert_eq!(data.message, "Extracting CV data...");
        });
    }

    #[test]
    fn parse_non_null_wrong_type_is_still_an_error() {
        assert_matches!(
            parse_frame(r#"{"type":"progress_update","data":{"stage":"extracting","metadata":[1]}}"#),
            Err(DecodeError::Payload { .. })
        );
    }

    #[test]
    fn parse_unknown_stage_keeps_token() {
        let json = r#"{"type":"progress_update","data":{"stage":"translating","percentage":10}}"#;
        let frame = parse_frame(json).unwrap();
        assert_matches!(frame, InboundFrame::ProgressUpdate(data) => {
            assert_eq!(data.stage, Stage::Other("translating".into()));
        });
    }

    #[test]
    fn parse_job_completed() {
        let json = r#"{"type":"job_completed","data":{"result":{"pdf_path":"/x.pdf"}}}"#;
        let frame = parse_frame(json).unwrap();
        assert_matches!(frame, InboundFrame::JobCompleted(data) => {
            assert_eq!(data.result["pdf_path"], "/x.pdf");
        });
    }

    #[test]
    fn parse_job_error() {
        let json = r#"{"type":"job_error","data":{"error":"PDF rendering failed"}}"#;
        assert_matches!(
            parse_frame(json).unwrap(),
            InboundFrame::JobError(ErrorData { error }) if error == "PDF rendering failed"
        );
    }

    #[test]
    fn parse_keepalive_with_and_without_data() {
        assert_eq!(parse_frame(r#"{"type":"keepalive"}"#).unwrap(), InboundFrame::Keepalive);
        assert_eq!(
            parse_frame(r#"{"type":"keepalive","data":{"ts":1}}"#).unwrap(),
            InboundFrame::Keepalive
        );
    }

    #[test]
    fn parse_unknown_type_is_not_an_error() {
        let frame = parse_frame(r#"{"type":"queue_position","data":{"position":2}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Unknown {
                kind: "queue_position".into()
            }
        );
        assert_eq!(frame.kind(), "queue_position");
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert_matches!(parse_frame("not json at all"), Err(DecodeError::Envelope(_)));
        assert_matches!(parse_frame(r#"{"data":{}}"#), Err(DecodeError::Envelope(_)));
    }

    #[test]
    fn parse_malformed_payload_returns_error() {
        assert_matches!(
            parse_frame(r#"{"type":"progress_update","data":{"percentage":5}}"#),
            Err(DecodeError::Payload { kind, .. }) if kind == "progress_update"
        );
        assert_matches!(
            parse_frame(r#"{"type":"job_error","data":{"error":42}}"#),
            Err(DecodeError::Payload { .. })
        );
    }

    #[test]
    fn outbound_frames_serialize_to_type_only() {
        assert_eq!(
            serde_json::to_string(&OutboundFrame::Pong).unwrap(),
            OutboundFrame::Pong.to_json()
        );
        assert_eq!(OutboundFrame::Ping.to_json(), r#"{"type":"ping"}"#);
    }
}
