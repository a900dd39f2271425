/// Server-issued job identifier. Opaque to the client.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
