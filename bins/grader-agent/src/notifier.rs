//! Webhook notifier - tells the caller the job is done

use async_trait::async_trait;
use grader_common::WebhookPayload;

use crate::error::NotifyError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<(), NotifyError>;
}

/// JSON `POST` to the webhook URL.
///
/// The HTTP client is built on first use, so a client that cannot be built
/// shows up as a failed notification at finalize rather than a failed start.
#[derive(Debug, Clone, Default)]
pub struct HttpNotifier;

impl HttpNotifier {
    pub fn new() -> Self {
        HttpNotifier
    }

    fn client(&self) -> Result<reqwest::Client, NotifyError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("grader-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, url: &str, payload: &WebhookPayload) -> Result<(), NotifyError> {
        // `.json()` sets Content-Type: application/json
        let response = self.client()?.post(url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status));
        }

        tracing::debug!(url, status = %status, "Webhook delivered");
        Ok(())
    }
}
