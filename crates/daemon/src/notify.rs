//! Notification channel client
//!
//! Fire-and-forget from this daemon's perspective: delivery is not
//! confirmed, and a failed send is only logged by the caller.

use async_trait::async_trait;
use std::time::Duration;
use wgfleet_common::{Error, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound user notification capability
#[async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// HTTP notifier posting to `{base}/sendMessage`
pub struct HttpNotifier {
    http: reqwest::Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| Error::Remote(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Notify for HttpNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Remote(format!(
                "sendMessage returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
