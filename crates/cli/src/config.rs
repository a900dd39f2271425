use std::time::Duration;

use anyhow::Context;

use cvflow_core::channel::PING_INTERVAL;
use cvflow_core::upload::{UploadConstraints, DEFAULT_ACCEPTED_FORMATS, DEFAULT_MAX_FILE_SIZE_MB};
use cvflow_progress::connector::ConnectorConfig;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Client configuration loaded from environment variables.
///
/// Every field has a default suitable for a backend on localhost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Backend base URL; the socket URL is derived from it.
    pub api_url: String,
    pub constraints: UploadConstraints,
    /// Overrides both reconnect presets when set.
    pub reconnect_delay: Option<Duration>,
    pub ping_interval: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            constraints: UploadConstraints::default(),
            reconnect_delay: None,
            ping_interval: PING_INTERVAL,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `CVFLOW_API_URL`             | `http://localhost:8000` |
    /// | `CVFLOW_MAX_FILE_SIZE_MB`    | `10`                    |
    /// | `CVFLOW_ACCEPTED_FORMATS`    | `.pdf,.docx,.doc,.txt`  |
    /// | `CVFLOW_RECONNECT_DELAY_MS`  | preset (3000 / 2000)    |
    /// | `CVFLOW_PING_INTERVAL_SECS`  | `30`                    |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_url = lookup("CVFLOW_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());

        let max_file_size_mb: u64 = match lookup("CVFLOW_MAX_FILE_SIZE_MB") {
            Some(v) => v
                .trim()
                .parse()
                .context("CVFLOW_MAX_FILE_SIZE_MB must be a valid u64")?,
            None => DEFAULT_MAX_FILE_SIZE_MB,
        };

        let accepted_formats: Vec<String> = match lookup("CVFLOW_ACCEPTED_FORMATS") {
            Some(v) => v.split(',').map(|s| s.trim().to_string()).collect(),
            None => DEFAULT_ACCEPTED_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        };

        let constraints = UploadConstraints::new(max_file_size_mb, accepted_formats)
            .context("Invalid upload constraints")?;

        let reconnect_delay = lookup("CVFLOW_RECONNECT_DELAY_MS")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .context("CVFLOW_RECONNECT_DELAY_MS must be a valid u64")
            })
            .transpose()?
            .map(Duration::from_millis);

        let ping_interval = match lookup("CVFLOW_PING_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .trim()
                    .parse()
                    .context("CVFLOW_PING_INTERVAL_SECS must be a valid u64")?;
                anyhow::ensure!(secs > 0, "CVFLOW_PING_INTERVAL_SECS must be greater than zero");
                Duration::from_secs(secs)
            }
            None => PING_INTERVAL,
        };

        Ok(Self {
            api_url,
            constraints,
            reconnect_delay,
            ping_interval,
        })
    }

    /// Connector settings for upload jobs.
    pub fn upload_connector(&self) -> ConnectorConfig {
        self.apply(ConnectorConfig::upload())
    }

    /// Connector settings for chat generation.
    pub fn chat_connector(&self) -> ConnectorConfig {
        self.apply(ConnectorConfig::chat())
    }

    fn apply(&self, mut config: ConnectorConfig) -> ConnectorConfig {
        if let Some(delay) = self.reconnect_delay {
            config.reconnect.delay = delay;
        }
        config.ping_interval = self.ping_interval;
        config
    }
}
