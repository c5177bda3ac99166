use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart;
use serde::de::DeserializeOwned;

use super::wire::{
    ErrorBody, ReactionBody, ReactionResponse, SendMessageBody, UploadResponse, WireMessage,
    WireMessagesResponse,
};
use super::{ApiError, ChatApi};
use crate::conversation::message::Message;
use crate::conversation::reactions::ReactionAction;
use crate::conversation::send::OutgoingMessage;
use crate::conversation::MessagePage;

/// `ChatApi` over the app's REST backend.
#[derive(Debug)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    network_enabled: bool,
}

impl HttpChatApi {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        network_enabled: bool,
    ) -> anyhow::Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("api base URL cannot be empty");
        }
        let access_token = access_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url,
            access_token,
            network_enabled,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self, conversation_id: &str, rest: &str) -> String {
        format!("{}/api/chats/{conversation_id}{rest}", self.base_url)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn ensure_network(&self) -> Result<(), ApiError> {
        if self.network_enabled {
            Ok(())
        } else {
            Err(ApiError::Network("network disabled".to_string()))
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        self.ensure_network()?;
        let resp = self
            .request(builder)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or_default().to_string()
                } else {
                    body
                }
            });
        Err(ApiError::from_status(status.as_u16(), message))
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: usize,
    ) -> Result<MessagePage, ApiError> {
        let url = self.chat_url(conversation_id, "/messages");
        let resp = self
            .send(
                self.client
                    .get(url)
                    .query(&[("limit", limit.to_string()), ("offset", offset.to_string())]),
            )
            .await?;
        Self::decode::<WireMessagesResponse>(resp).await?.into_page()
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<Message, ApiError> {
        let url = self.chat_url(conversation_id, "/messages");
        let reply_to_id = outgoing.reply_to.as_ref().map(|r| r.id.key());
        let body = SendMessageBody {
            content: outgoing.text.as_deref().unwrap_or(""),
            media_urls: &outgoing.attachment_urls,
            reply_to_id: reply_to_id.as_deref(),
        };
        let resp = self.send(self.client.post(url).json(&body)).await?;
        Self::decode::<WireMessage>(resp).await?.into_message()
    }

    async fn toggle_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<ReactionAction, ApiError> {
        let url = self.chat_url(conversation_id, &format!("/messages/{message_id}/reactions"));
        let resp = self
            .send(self.client.post(url).json(&ReactionBody { emoji }))
            .await?;
        Self::decode::<ReactionResponse>(resp).await?.into_action()
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.chat_url(conversation_id, "/read");
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn upload_attachment(
        &self,
        conversation_id: &str,
        local_uri: &str,
    ) -> Result<String, ApiError> {
        self.ensure_network()?;
        let path = local_uri.strip_prefix("file://").unwrap_or(local_uri);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Rejected {
                status: 0,
                message: format!("cannot read attachment: {e}"),
            })?;
        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        let form = multipart::Form::new()
            .text("chat_id", conversation_id.to_string())
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));
        let url = format!("{}/api/chats/upload", self.base_url);
        let resp = self.send(self.client.post(url).multipart(form)).await?;
        Ok(Self::decode::<UploadResponse>(resp).await?.url)
    }
}
