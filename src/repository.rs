//! Local-first chat repository.
//!
//! Reads prefer the SQLite cache and fall back to it when the server cannot
//! answer; rename and star are written locally before the server is asked.
//! Every operation ends in `Ok` or a [`RepositoryError`]; nothing here panics
//! or leaves an error uncaught.

use crate::api::{ChatApi, SendChatMessageResponse, SendQueryResponse};
use crate::error::{ApiError, RepositoryError};
use crate::markdown::strip_markdown;
use crate::models::{ChatMessage, ChatSummary, DisplayMessage, Sender};
use crate::storage::StorageManager;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type RepoResult<T> = Result<T, RepositoryError>;

pub struct ChatRepository {
    storage: Arc<StorageManager>,
    api: Arc<dyn ChatApi>,
}

// Picks the server's message when it sent one.
fn rejection(message: &str, fallback: &str) -> RepositoryError {
    if message.trim().is_empty() {
        RepositoryError::Rejected(fallback.to_string())
    } else {
        RepositoryError::Rejected(message.to_string())
    }
}

/// Parses a server timestamp, substituting the current time when it is missing or
/// malformed. Accepts RFC 3339, which covers the `yyyy-MM-ddTHH:mm:ss.SSSZ` form.
pub fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Converts a wire message for display. Assistant text is stripped of markdown,
/// user text is kept verbatim.
pub fn to_display(message: &ChatMessage) -> DisplayMessage {
    let sender = Sender::from_tag(&message.sender);
    let content = match sender {
        Sender::User => message.message.clone(),
        Sender::Assistant => strip_markdown(&message.message),
    };
    DisplayMessage {
        id: message.id.clone(),
        sender,
        content,
        timestamp: parse_timestamp(message.timestamp.as_deref()),
    }
}

impl ChatRepository {
    pub fn new(storage: Arc<StorageManager>, api: Arc<dyn ChatApi>) -> Self {
        Self { storage, api }
    }

    /// Lists the user's chats.
    ///
    /// Without `force_refresh` a non-empty cache is returned as is and the server
    /// is not contacted. Otherwise the server list is fetched and cached. When the
    /// server fails in any way, cached rows are returned instead; the error only
    /// surfaces when the cache is empty too.
    pub async fn get_user_chats(&self, user_id: &str, force_refresh: bool) -> RepoResult<Vec<ChatSummary>> {
        if !force_refresh {
            if let Some(cached) = self.cached_chats(user_id).await {
                log::debug!("get_user_chats: serving {} cached chats for {}", cached.len(), user_id);
                return Ok(cached);
            }
        }

        log::debug!("get_user_chats: fetching chats from API for user {}", user_id);
        let failure = match self.api.list_chats(user_id).await {
            Ok(response) if response.success => {
                log::info!("get_user_chats: fetched {} chats from API", response.chats.len());
                if let Err(e) = self.storage.upsert_chats(user_id, &response.chats).await {
                    log::error!("get_user_chats: failed to cache chats: {:#}", e);
                }
                return Ok(response.chats);
            }
            Ok(response) => {
                log::error!("get_user_chats: API returned success=false");
                rejection(&response.message, "Failed to fetch chats")
            }
            Err(e) => {
                log::error!("get_user_chats: {}", e);
                RepositoryError::network(&e)
            }
        };

        match self.cached_chats(user_id).await {
            Some(stale) => {
                log::warn!("get_user_chats: using {} cached chats as fallback", stale.len());
                Ok(stale)
            }
            None => Err(failure),
        }
    }

    // Cached rows, or None when the cache is empty or unreadable.
    async fn cached_chats(&self, user_id: &str) -> Option<Vec<ChatSummary>> {
        match self.storage.has_any_chats(user_id).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                log::warn!("Could not check chat cache for {}: {:#}", user_id, e);
                return None;
            }
        }
        match self.storage.list_chats_by_user(user_id).await {
            Ok(chats) if !chats.is_empty() => Some(chats),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Could not read chat cache for {}: {:#}", user_id, e);
                None
            }
        }
    }

    // Pulls the server list into the cache after a write that created data remotely.
    async fn refresh_cache(&self, user_id: &str) {
        if let Err(e) = self.get_user_chats(user_id, true).await {
            log::warn!("Cache refresh for {} failed: {}", user_id, e);
        }
    }

    /// Creates a chat on the server and returns its id. Nothing is written locally
    /// until the follow-up refresh pulls the new chat in.
    pub async fn create_chat(&self, user_id: &str, title: &str) -> RepoResult<String> {
        log::info!("create_chat: creating '{}' for user {}", title, user_id);
        match self.api.create_chat(user_id, title).await {
            Ok(response) if response.success => {
                log::info!("create_chat: created chat {}", response.chat_id);
                self.refresh_cache(user_id).await;
                Ok(response.chat_id)
            }
            Ok(response) => {
                log::error!("create_chat: API returned success=false");
                Err(rejection(&response.message, "Failed to create chat"))
            }
            Err(e) => {
                log::error!("create_chat: {}", e);
                Err(RepositoryError::network(&e))
            }
        }
    }

    /// Deletes on the server first; the cached row only goes once the server agreed.
    /// A server refusal reads `Failed to delete chat: <reason>`.
    pub async fn delete_chat(&self, user_id: &str, chat_id: &str) -> RepoResult<()> {
        log::warn!("delete_chat: deleting chat {} for user {}", chat_id, user_id);
        match self.api.delete_chat(user_id, chat_id).await {
            Ok(()) => {}
            Err(ApiError::Http { status, message }) => {
                log::error!("delete_chat: server answered {}: {}", status, message);
                return Err(RepositoryError::Rejected(format!("Failed to delete chat: {}", message)));
            }
            Err(e) => {
                log::error!("delete_chat: {}", e);
                return Err(RepositoryError::network(&e));
            }
        }

        match self.storage.delete_chat(chat_id).await {
            Ok(true) => log::debug!("delete_chat: removed cached row"),
            Ok(false) => log::debug!("delete_chat: chat was not cached"),
            Err(e) => log::error!("delete_chat: local delete failed: {:#}", e),
        }
        Ok(())
    }

    /// Optimistic rename. An explicit server rejection restores the previous row;
    /// HTTP and transport failures keep the local title and report success.
    pub async fn rename_chat(&self, user_id: &str, chat_id: &str, new_title: &str) -> RepoResult<()> {
        log::info!("rename_chat: renaming {} to '{}'", chat_id, new_title);
        let previous = self.snapshot(chat_id).await;
        match self.storage.update_chat_title(chat_id, new_title).await {
            Ok(updated) => log::debug!("rename_chat: local update applied={}", updated),
            Err(e) => log::error!("rename_chat: local update failed: {:#}", e),
        }

        let outcome = self.api.rename_chat(user_id, chat_id, new_title).await;
        self.settle_optimistic(user_id, previous, outcome.map(|r| (r.success, r.message)), "Failed to rename chat")
            .await
    }

    /// Optimistic star toggle, with the same reconciliation as [`Self::rename_chat`].
    pub async fn star_chat(&self, user_id: &str, chat_id: &str, starred: bool) -> RepoResult<()> {
        log::info!("star_chat: setting starred={} on {}", starred, chat_id);
        let previous = self.snapshot(chat_id).await;
        match self.storage.update_chat_starred(chat_id, starred).await {
            Ok(updated) => log::debug!("star_chat: local update applied={}", updated),
            Err(e) => log::error!("star_chat: local update failed: {:#}", e),
        }

        let fallback = if starred { "Failed to star chat" } else { "Failed to unstar chat" };
        let outcome = self.api.star_chat(user_id, chat_id, starred).await;
        self.settle_optimistic(user_id, previous, outcome.map(|r| (r.success, r.message)), fallback)
            .await
    }

    async fn snapshot(&self, chat_id: &str) -> Option<ChatSummary> {
        match self.storage.get_chat(chat_id).await {
            Ok(row) => row,
            Err(e) => {
                log::warn!("Could not snapshot chat {}: {:#}", chat_id, e);
                None
            }
        }
    }

    async fn settle_optimistic(
        &self,
        user_id: &str,
        previous: Option<ChatSummary>,
        outcome: Result<(bool, String), ApiError>,
        fallback: &str,
    ) -> RepoResult<()> {
        match outcome {
            Ok((true, _)) => Ok(()),
            Ok((false, message)) => {
                log::error!("Server rejected optimistic edit: {}", fallback);
                if let Some(row) = previous {
                    if let Err(e) = self.storage.upsert_chat(user_id, &row).await {
                        log::error!("Failed to revert chat {}: {:#}", row.id, e);
                    }
                }
                Err(rejection(&message, fallback))
            }
            Err(e) => {
                log::warn!("Keeping offline edit, server unreachable: {}", e);
                Ok(())
            }
        }
    }

    /// Fetches a chat's history from the server. Messages are never cached.
    pub async fn get_chat_messages(&self, user_id: &str, chat_id: &str) -> RepoResult<Vec<DisplayMessage>> {
        log::debug!("get_chat_messages: fetching chat {} for user {}", chat_id, user_id);
        match self.api.list_messages(user_id, chat_id).await {
            Ok(response) if response.success => {
                log::info!("get_chat_messages: fetched {} messages", response.messages.len());
                Ok(response.messages.iter().map(to_display).collect())
            }
            Ok(response) => {
                log::error!("get_chat_messages: API returned success=false");
                Err(rejection(&response.message, "Failed to fetch messages"))
            }
            Err(e) => {
                log::error!("get_chat_messages: {}", e);
                Err(RepositoryError::network(&e))
            }
        }
    }

    /// Sends a message to an existing chat and refreshes the cached summaries.
    pub async fn send_chat_message(
        &self,
        user_id: &str,
        chat_id: &str,
        message: &str,
    ) -> RepoResult<SendChatMessageResponse> {
        log::debug!("send_chat_message: sending to chat {} for user {}", chat_id, user_id);
        match self.api.send_chat_message(user_id, chat_id, message).await {
            Ok(response) if response.success => {
                self.refresh_cache(user_id).await;
                Ok(response)
            }
            Ok(response) => {
                log::error!("send_chat_message: API returned success=false");
                Err(rejection(&response.message, "Failed to send message"))
            }
            Err(e) => {
                log::error!("send_chat_message: {}", e);
                Err(RepositoryError::network(&e))
            }
        }
    }

    /// Sends a freeform query, which may create a chat server-side.
    pub async fn send_query(&self, user_id: &str, query: &str) -> RepoResult<SendQueryResponse> {
        log::debug!("send_query: sending query for user {}", user_id);
        match self.api.send_query(user_id, query).await {
            Ok(response) if response.success => {
                if let Some(chat_id) = &response.chat_id {
                    log::info!("send_query: answered in chat {}", chat_id);
                }
                self.refresh_cache(user_id).await;
                Ok(response)
            }
            Ok(response) => {
                log::error!("send_query: API returned success=false");
                Err(rejection(&response.message, "Failed to send query"))
            }
            Err(e) => {
                log::error!("send_query: {}", e);
                Err(RepositoryError::network(&e))
            }
        }
    }

    /// Submits feedback text; returns the server's confirmation message.
    pub async fn submit_feedback(&self, user_id: &str, feedback: &str) -> RepoResult<String> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(RepositoryError::Rejected("Feedback cannot be empty".to_string()));
        }
        match self.api.submit_feedback(user_id, feedback).await {
            Ok(response) if response.success => Ok(response.message),
            Ok(response) => Err(rejection(&response.message, "Failed to send feedback")),
            Err(e) => {
                log::error!("submit_feedback: {}", e);
                Err(RepositoryError::network(&e))
            }
        }
    }

    /// Drops every cached chat of the user. Returns the number of rows removed.
    pub async fn clear_local_cache(&self, user_id: &str) -> RepoResult<u64> {
        Ok(self.storage.delete_all_chats_for_user(user_id).await?)
    }
}
