//! Application state for one user session.
//!
//! [`CvSession`] is built once per session and passed to whatever drives
//! the UI. It owns the REST and socket clients, the upload constraints and
//! at most one active [`ProgressSubscription`]. Starting a new job tears
//! down the previous subscription first.

use std::path::Path;

use cvflow_core::upload::UploadConstraints;

use crate::api::{CvApi, CvApiError, GenerateResponse};
use crate::client::ProgressClient;
use crate::connector::{ConnectorConfig, ProgressSubscription};

/// Template used when the caller does not pick one.
pub const DEFAULT_TEMPLATE: &str = "default";

pub struct CvSession {
    session_id: String,
    api: CvApi,
    client: ProgressClient,
    constraints: UploadConstraints,
    upload_config: ConnectorConfig,
    chat_config: ConnectorConfig,
    active: Option<ProgressSubscription>,
}

impl CvSession {
    /// New session against `base_url` with a fresh session id.
    pub fn new(base_url: &str, constraints: UploadConstraints) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            api: CvApi::new(base_url),
            client: ProgressClient::new(base_url),
            constraints,
            upload_config: ConnectorConfig::upload(),
            chat_config: ConnectorConfig::chat(),
            active: None,
        }
    }

    pub fn with_upload_config(mut self, config: ConnectorConfig) -> Self {
        self.upload_config = config;
        self
    }

    pub fn with_chat_config(mut self, config: ConnectorConfig) -> Self {
        self.chat_config = config;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn constraints(&self) -> &UploadConstraints {
        &self.constraints
    }

    /// The subscription of the job currently followed, if any.
    pub fn active(&mut self) -> Option<&mut ProgressSubscription> {
        self.active.as_mut()
    }

    /// Upload a CV and start following its job.
    ///
    /// Validation and request errors are returned once; the previous
    /// subscription is torn down either way.
    pub async fn start_upload(
        &mut self,
        path: &Path,
    ) -> Result<&mut ProgressSubscription, CvApiError> {
        self.reset().await;

        let job_id = self.api.process_cv(path, &self.constraints).await?;
        let subscription =
            ProgressSubscription::start(self.client.clone(), job_id, self.upload_config.clone());
        Ok(self.active.insert(subscription))
    }

    /// Generate a CV from a chat prompt.
    ///
    /// The session socket is opened before the request so stage updates
    /// emitted while the server works are not missed. The subscription
    /// stays active after a successful response for the caller to inspect
    /// and is torn down when the request fails.
    pub async fn start_generation(
        &mut self,
        user_input: &str,
        template: Option<&str>,
    ) -> Result<GenerateResponse, CvApiError> {
        self.reset().await;

        self.active = Some(ProgressSubscription::start(
            self.client.clone(),
            self.session_id.clone(),
            self.chat_config.clone(),
        ));

        let template = template.unwrap_or(DEFAULT_TEMPLATE);
        let response = self
            .api
            .generate_cv(user_input, template, &self.session_id)
            .await;
        if response.is_err() {
            self.reset().await;
        }
        response
    }

    /// Tear down the active subscription, if any.
    pub async fn reset(&mut self) {
        if let Some(mut subscription) = self.active.take() {
            tracing::debug!(job_id = subscription.job_id(), "Resetting active subscription");
            subscription.shutdown().await;
        }
    }
}
