use crate::markdown::strip_markdown;
use crate::models::{DisplayMessage, Sender};
use crate::repository::ChatRepository;
use std::sync::Arc;

pub const HISTORY_FAILED_TEXT: &str = "Failed to load chat history. Please try again.";
pub const APOLOGY_TEXT: &str = "Sorry, I couldn't process your message. Please try again.";
pub const NO_RESPONSE_TEXT: &str = "No response received";

/// In-memory transcript of one chat screen.
///
/// A conversation without a chat id sends freeform queries; the first answer
/// carries the id of the chat the server created, and later messages go to it.
pub struct Conversation {
    repository: Arc<ChatRepository>,
    user_id: String,
    chat_id: Option<String>,
    messages: Vec<DisplayMessage>,
}

impl Conversation {
    pub fn new(repository: Arc<ChatRepository>, user_id: impl Into<String>, chat_id: Option<String>) -> Self {
        Self {
            repository,
            user_id: user_id.into(),
            chat_id,
            messages: Vec::new(),
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    /// Replaces the transcript with the server history. On failure the transcript
    /// becomes a single assistant line saying so. Returns whether history loaded.
    pub async fn load(&mut self) -> bool {
        let Some(chat_id) = self.chat_id.clone() else {
            return true;
        };
        match self.repository.get_chat_messages(&self.user_id, &chat_id).await {
            Ok(messages) => {
                log::debug!("Loaded {} messages for chat {}", messages.len(), chat_id);
                self.messages = messages;
                true
            }
            Err(e) => {
                log::error!("Failed to load chat {}: {}", chat_id, e);
                self.messages = vec![DisplayMessage::local(Sender::Assistant, HISTORY_FAILED_TEXT)];
                false
            }
        }
    }

    /// Appends the user's text and then the assistant's reply, or an apology when
    /// the exchange failed. Blank input is ignored and returns `None`.
    pub async fn send(&mut self, text: &str) -> Option<&DisplayMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.messages.push(DisplayMessage::local(Sender::User, text));

        let reply = match self.chat_id.clone() {
            Some(chat_id) => self
                .repository
                .send_chat_message(&self.user_id, &chat_id, text)
                .await
                .map(|r| r.response),
            None => match self.repository.send_query(&self.user_id, text).await {
                Ok(r) => {
                    if let Some(id) = r.chat_id.filter(|id| !id.is_empty()) {
                        log::info!("Conversation bound to new chat {}", id);
                        self.chat_id = Some(id);
                    }
                    Ok(r.response)
                }
                Err(e) => Err(e),
            },
        };

        let content = match reply {
            Ok(response) => strip_markdown(response.as_deref().unwrap_or(NO_RESPONSE_TEXT)),
            Err(e) => {
                log::error!("Message exchange failed: {}", e);
                APOLOGY_TEXT.to_string()
            }
        };
        self.messages.push(DisplayMessage::local(Sender::Assistant, content));
        self.messages.last()
    }
}
