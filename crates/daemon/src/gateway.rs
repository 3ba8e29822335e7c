//! Gateway agent HTTP client
//!
//! Every call carries a bounded timeout; there is no in-call retry. The next
//! scheduled worker pass is the retry policy.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use wgfleet_common::{Error, Gateway, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Response to a peer-creation call
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePeerResponse {
    pub success: bool,
    /// Base64 client config text
    pub conf: Option<String>,
    /// Base64 scannable image of the config
    pub qr: Option<String>,
    #[serde(default)]
    pub already_exist: bool,
    pub public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    success: bool,
}

/// Gateway peer operations as seen by the manager
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Peer ids currently live on the gateway
    async fn list_peers(&self, gateway: &Gateway) -> Result<Vec<i64>>;

    async fn create_peer(&self, gateway: &Gateway, user_id: i64) -> Result<CreatePeerResponse>;

    async fn remove_peer(&self, gateway: &Gateway, user_id: i64) -> Result<()>;

    async fn enable_peer(&self, gateway: &Gateway, user_id: i64, public_key: &str) -> Result<()>;

    async fn disable_peer(&self, gateway: &Gateway, user_id: i64) -> Result<()>;
}

/// HTTP client for the gateway agent API
pub struct HttpGatewayClient {
    http: reqwest::Client,
    port: u16,
}

impl HttpGatewayClient {
    pub fn new(port: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| Error::Remote(e.to_string()))?;
        Ok(Self { http, port })
    }

    fn url(&self, gateway: &Gateway, path: &str) -> String {
        format!("http://{}:{}{}", gateway.address, self.port, path)
    }

    async fn expect_success(&self, response: reqwest::Response, what: &str) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("{} returned {}", what, status)));
        }
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        if !body.success {
            return Err(Error::Remote(format!("{} reported failure", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayApi for HttpGatewayClient {
    async fn list_peers(&self, gateway: &Gateway) -> Result<Vec<i64>> {
        let response = self
            .http
            .get(self.url(gateway, "/clients"))
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Remote(format!(
                "list peers on {} returned {}",
                gateway.name,
                response.status()
            )));
        }
        response
            .json::<Vec<i64>>()
            .await
            .map_err(|e| Error::Remote(e.to_string()))
    }

    async fn create_peer(&self, gateway: &Gateway, user_id: i64) -> Result<CreatePeerResponse> {
        let response = self
            .http
            .post(self.url(gateway, "/client"))
            .json(&serde_json::json!({ "id": user_id }))
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Remote(format!(
                "create peer on {} returned {}",
                gateway.name,
                response.status()
            )));
        }
        response
            .json::<CreatePeerResponse>()
            .await
            .map_err(|e| Error::Remote(e.to_string()))
    }

    async fn remove_peer(&self, gateway: &Gateway, user_id: i64) -> Result<()> {
        let response = self
            .http
            .delete(self.url(gateway, &format!("/client/{}", user_id)))
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        self.expect_success(response, "remove peer").await
    }

    async fn enable_peer(&self, gateway: &Gateway, user_id: i64, public_key: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(gateway, "/client/enable"))
            .json(&serde_json::json!({ "id": user_id, "public_key": public_key }))
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        self.expect_success(response, "enable peer").await
    }

    async fn disable_peer(&self, gateway: &Gateway, user_id: i64) -> Result<()> {
        let response = self
            .http
            .post(self.url(gateway, "/client/disable"))
            .json(&serde_json::json!({ "id": user_id }))
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;
        self.expect_success(response, "disable peer").await
    }
}
