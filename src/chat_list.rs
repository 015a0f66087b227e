//! Observable chat list per user.
//!
//! Loading is a state on the stream, never a result value. Each refresh bumps the
//! user's generation; a refresh that finishes after a newer one started is
//! discarded, so only the latest request can publish.

use crate::models::ChatSummary;
use crate::repository::ChatRepository;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }
}

pub type ChatListState = LoadState<Vec<ChatSummary>>;

struct ListSlot {
    generation: u64,
    state: watch::Sender<ChatListState>,
}

impl ListSlot {
    fn new() -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self { generation: 0, state }
    }
}

pub struct ChatListView {
    repository: Arc<ChatRepository>,
    slots: DashMap<String, ListSlot>,
}

impl ChatListView {
    pub fn new(repository: Arc<ChatRepository>) -> Self {
        Self {
            repository,
            slots: DashMap::new(),
        }
    }

    /// Stream of the user's list state. Subscribing never triggers a load.
    pub fn subscribe(&self, user_id: &str) -> watch::Receiver<ChatListState> {
        self.slots
            .entry(user_id.to_string())
            .or_insert_with(ListSlot::new)
            .state
            .subscribe()
    }

    pub fn current(&self, user_id: &str) -> ChatListState {
        self.slots
            .get(user_id)
            .map(|slot| slot.state.borrow().clone())
            .unwrap_or(LoadState::Idle)
    }

    /// Loads the list and publishes the outcome. Returns `false` when a newer
    /// refresh for the same user superseded this one.
    pub async fn refresh(&self, user_id: &str, force_refresh: bool) -> bool {
        let generation = {
            let mut slot = self
                .slots
                .entry(user_id.to_string())
                .or_insert_with(ListSlot::new);
            slot.generation += 1;
            slot.state.send_replace(LoadState::Loading);
            slot.generation
        };

        let result = self.repository.get_user_chats(user_id, force_refresh).await;

        let Some(slot) = self.slots.get(user_id) else {
            return false;
        };
        if slot.generation != generation {
            log::debug!(
                "Discarding chat list generation {} for {} (latest is {})",
                generation,
                user_id,
                slot.generation
            );
            return false;
        }
        let next = match result {
            Ok(chats) => LoadState::Ready(chats),
            Err(e) => {
                log::warn!("Chat list refresh for {} failed: {}", user_id, e);
                LoadState::Failed(e.to_string())
            }
        };
        slot.state.send_replace(next);
        true
    }

    /// Forgets the user's stream, e.g. after sign-out. Open receivers see the
    /// channel close.
    pub fn forget(&self, user_id: &str) {
        self.slots.remove(user_id);
    }
}

/// Case-insensitive search over title and preview. A blank query keeps everything.
pub fn filter_chats(chats: &[ChatSummary], query: &str) -> Vec<ChatSummary> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return chats.to_vec();
    }
    chats
        .iter()
        .filter(|c| c.title.to_lowercase().contains(&needle) || c.preview.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
