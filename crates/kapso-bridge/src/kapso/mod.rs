//! Kapso WhatsApp Cloud API client
//!
//! Thin REST client for the Kapso-hosted Meta WhatsApp Business API.
//! The client holds credentials and an HTTP transport, nothing else.

use crate::error::{Error, Result};
use serde::Serialize;
use tracing::debug;

/// Wire types shared with the webhook receiver.
pub mod types;

#[cfg(test)]
mod tests;

pub use types::{
    Change, ChangeValue, Contact, ContactProfile, Entry, InboundMessage, ListMessagesParams,
    ListMessagesResponse, LocationContent, MediaContent, MediaInfo, Message, Metadata, Paging,
    SendMessageResponse, TextContent, WebhookPayload,
};

const BASE_URL: &str = "https://api.kapso.ai/meta/whatsapp/v24.0";

/// Kapso API client
pub struct Client {
    api_key: String,
    phone_number_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    /// Create a Kapso API client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>, phone_number_id: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            phone_number_id: phone_number_id.into(),
            base_url: BASE_URL.to_string(),
            http,
        })
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a text message. Returns the provider-assigned message ID.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<String> {
        #[derive(Serialize)]
        struct SendRequest<'a> {
            messaging_product: &'static str,
            recipient_type: &'static str,
            to: &'a str,
            #[serde(rename = "type")]
            message_type: &'static str,
            text: TextContent,
        }

        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let request = SendRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            message_type: "text",
            text: TextContent {
                body: body.to_string(),
            },
        };

        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(format!("send message: {e}")))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("read response: {e}")))?;

        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            return Err(Error::Provider {
                status: status.as_u16(),
                body: raw,
            });
        }

        let parsed: SendMessageResponse = serde_json::from_str(&raw)
            .map_err(|e| Error::Network(format!("parse send response: {e}")))?;

        Ok(parsed
            .messages
            .first()
            .map(|m| m.id.clone())
            .unwrap_or_default())
    }

    /// List messages from the Kapso API with cursor-based paging.
    pub async fn list_messages(&self, params: ListMessagesParams) -> Result<ListMessagesResponse> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);

        let mut query: Vec<(&str, String)> = Vec::new();
        if !params.direction.is_empty() {
            query.push(("direction", params.direction.clone()));
        }
        if !params.since.is_empty() {
            query.push(("since", params.since.clone()));
        }
        if params.limit > 0 {
            query.push(("limit", params.limit.to_string()));
        }
        if !params.after.is_empty() {
            query.push(("after", params.after.clone()));
        }

        let response = self
            .http
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Network(format!("list messages: {e}")))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("read response: {e}")))?;

        if status != reqwest::StatusCode::OK {
            return Err(Error::Provider {
                status: status.as_u16(),
                body: raw,
            });
        }

        serde_json::from_str(&raw).map_err(|e| Error::Network(format!("parse list response: {e}")))
    }

    /// Resolve a media ID to a download URL. Best-effort: callers treat
    /// failures as non-fatal and omit the URL.
    pub async fn media_url(&self, media_id: &str) -> Result<MediaInfo> {
        let url = format!("{}/{}", self.base_url, media_id);

        let response = self
            .http
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Network(format!("media lookup: {e}")))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("read response: {e}")))?;

        if status != reqwest::StatusCode::OK {
            debug!(media_id = %media_id, status = status.as_u16(), "media lookup failed");
            return Err(Error::Provider {
                status: status.as_u16(),
                body: raw,
            });
        }

        serde_json::from_str(&raw).map_err(|e| Error::Network(format!("parse media response: {e}")))
    }
}
