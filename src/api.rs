use crate::error::ApiError;
use crate::models::{ChatMessage, ChatSummary};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Trait defining the REST backend the chat repository talks to.
// Pure transport: no retries and no caching happen behind it.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_chats(&self, user_id: &str) -> Result<ListChatsResponse, ApiError>;

    async fn create_chat(&self, user_id: &str, title: &str) -> Result<CreateChatResponse, ApiError>;

    // Only the status matters; the body is ignored.
    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<(), ApiError>;

    async fn rename_chat(&self, user_id: &str, chat_id: &str, title: &str) -> Result<AckResponse, ApiError>;

    async fn star_chat(&self, user_id: &str, chat_id: &str, starred: bool) -> Result<AckResponse, ApiError>;

    async fn list_messages(&self, user_id: &str, chat_id: &str) -> Result<ChatMessagesResponse, ApiError>;

    async fn send_chat_message(
        &self,
        user_id: &str,
        chat_id: &str,
        message: &str,
    ) -> Result<SendChatMessageResponse, ApiError>;

    // Freeform query; the server creates a chat when needed and returns its id.
    async fn send_query(&self, user_id: &str, query: &str) -> Result<SendQueryResponse, ApiError>;

    async fn submit_feedback(&self, user_id: &str, feedback: &str) -> Result<AckResponse, ApiError>;
}

// --- Wire types ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListChatsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub chats: Vec<ChatSummary>,
    #[serde(default)]
    pub total_chats: usize,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Debug)]
struct CreateChatRequest<'a> {
    title: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub chat_id: String,
}

// Shared shape of rename, star and feedback responses
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Debug)]
struct RenameChatRequest<'a> {
    title: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StarChatRequest {
    is_starred: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessagesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Debug)]
struct SendChatMessageRequest<'a> {
    message: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendChatMessageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Serialize, Debug)]
struct SendQueryRequest<'a> {
    query: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendQueryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Serialize, Debug)]
struct FeedbackRequest<'a> {
    feedback: &'a str,
}

// Error bodies look like {"error": "..."}; some endpoints use "message".
#[derive(Deserialize, Debug)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

// --- reqwest implementation ---

pub struct HttpChatApi {
    client: Client,
    base_url: Url,
}

impl HttpChatApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, anyhow::Error> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid API base URL '{}': {}", base_url, e))?;
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("Base URL cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            log::error!("API request failed to send: {}", e);
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        log::error!("API request failed with status {}: {}", status, message);
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            log::warn!("Failed to decode API response: {}", e);
            ApiError::Decode(e.to_string())
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_chats(&self, user_id: &str) -> Result<ListChatsResponse, ApiError> {
        log::debug!("GET chats for user {}", user_id);
        let url = self.endpoint(&["api", "chats", user_id])?;
        self.send_json(self.client.get(url)).await
    }

    async fn create_chat(&self, user_id: &str, title: &str) -> Result<CreateChatResponse, ApiError> {
        log::debug!("POST chat '{}' for user {}", title, user_id);
        let url = self.endpoint(&["api", "chats", user_id])?;
        self.send_json(self.client.post(url).json(&CreateChatRequest { title }))
            .await
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<(), ApiError> {
        log::debug!("DELETE chat {} for user {}", chat_id, user_id);
        let url = self.endpoint(&["api", "chats", user_id, chat_id])?;
        self.execute(self.client.delete(url)).await.map(|_| ())
    }

    async fn rename_chat(&self, user_id: &str, chat_id: &str, title: &str) -> Result<AckResponse, ApiError> {
        let url = self.endpoint(&["api", "chats", user_id, chat_id, "rename"])?;
        self.send_json(self.client.put(url).json(&RenameChatRequest { title }))
            .await
    }

    async fn star_chat(&self, user_id: &str, chat_id: &str, starred: bool) -> Result<AckResponse, ApiError> {
        let url = self.endpoint(&["api", "chats", user_id, chat_id, "star"])?;
        self.send_json(self.client.put(url).json(&StarChatRequest { is_starred: starred }))
            .await
    }

    async fn list_messages(&self, user_id: &str, chat_id: &str) -> Result<ChatMessagesResponse, ApiError> {
        let url = self.endpoint(&["api", "chats", user_id, chat_id, "messages"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn send_chat_message(
        &self,
        user_id: &str,
        chat_id: &str,
        message: &str,
    ) -> Result<SendChatMessageResponse, ApiError> {
        let url = self.endpoint(&["api", "chats", user_id, chat_id, "messages"])?;
        self.send_json(self.client.post(url).json(&SendChatMessageRequest { message }))
            .await
    }

    async fn send_query(&self, user_id: &str, query: &str) -> Result<SendQueryResponse, ApiError> {
        let url = self.endpoint(&["api", "query", user_id])?;
        self.send_json(self.client.post(url).json(&SendQueryRequest { query }))
            .await
    }

    async fn submit_feedback(&self, user_id: &str, feedback: &str) -> Result<AckResponse, ApiError> {
        let url = self.endpoint(&["api", "user", user_id, "feedback"])?;
        self.send_json(self.client.post(url).json(&FeedbackRequest { feedback }))
            .await
    }
}
