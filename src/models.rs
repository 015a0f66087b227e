use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Who wrote a message. The backend sends "user" or "assistant".
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }

    /// Anything that is not literally "user" is treated as the assistant.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "user" {
            Sender::User
        } else {
            Sender::Assistant
        }
    }
}

// Summary metadata for one remote chat, as listed by the backend and cached locally
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_sender: Option<String>, // "user" or "assistant"
    #[serde(default)]
    pub message_count: i64,
    #[serde(default)]
    pub created_at: Option<String>, // ISO-8601, as sent by the server
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub is_starred: bool,
}

// A message as returned by the messages endpoint (never cached)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// A message ready for the conversation view
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DisplayMessage {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl DisplayMessage {
    /// Builds a message that only exists in memory (optimistic appends, fallback lines).
    pub fn local(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.sender == Sender::User
    }
}

// Locally cached profile, one per authenticated user
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub username: String,  // may be blank
    pub full_name: String, // may be blank
    pub profile_completed: bool,
    pub last_sync_timestamp: i64, // epoch millis
}

impl UserProfile {
    /// Blank profile created right after the first authentication.
    pub fn from_auth(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            username: String::new(),
            full_name: String::new(),
            profile_completed: false,
            last_sync_timestamp: Utc::now().timestamp_millis(),
        }
    }
}
