use async_trait::async_trait;
use ember_types::{
    Channel, ChannelList, CreateChannelRequest, MessageList, SubmitTurnRequest,
    SubmitTurnResponse,
};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::ClientError;

/// Anything that can list a channel's messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn list_messages(&self, channel_id: &str) -> Result<MessageList, ClientError>;
}

/// Typed HTTP client for `ember-server`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_channels(&self) -> Result<ChannelList, ClientError> {
        let resp = self
            .http
            .get(format!("{}/api/channels", self.base_url))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn create_channel(&self, name: Option<String>) -> Result<Channel, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/channels", self.base_url))
            .json(&CreateChannelRequest { name })
            .send()
            .await?;
        decode(resp).await
    }

    /// Returns as soon as the server has stored the turn; the assistant
    /// placeholder in the response is still pending.
    pub async fn submit_turn(
        &self,
        req: &SubmitTurnRequest,
    ) -> Result<SubmitTurnResponse, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/send", self.base_url))
            .json(req)
            .send()
            .await?;
        decode(resp).await
    }
}

#[async_trait]
impl MessageSource for ApiClient {
    async fn list_messages(&self, channel_id: &str) -> Result<MessageList, ClientError> {
        let url = Url::parse_with_params(
            &format!("{}/api/messages", self.base_url),
            &[("channelId", channel_id)],
        )
        .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let resp = self.http.get(url).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "request failed");
    // Server errors carry `{"error": "..."}`; anything else is passed through.
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or(body);
    Err(ClientError::Status { status: status.as_u16(), message })
}
