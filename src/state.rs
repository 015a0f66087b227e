use crate::api::{ChatApi, HttpChatApi};
use crate::auth::{AuthManager, FirebaseIdentityProvider, IdentityProvider};
use crate::chat_list::ChatListView;
use crate::config::{get_api_key, AppConfig};
use crate::conversation::Conversation;
use crate::repository::ChatRepository;
use crate::session::{Clock, SessionManager, SystemClock};
use crate::storage::StorageManager;
use std::sync::Arc;

// Everything the UI layer needs, built once at start-up and cloned into tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<StorageManager>, // one pool for the whole process
    pub chats: Arc<ChatRepository>,
    pub chat_lists: Arc<ChatListView>,
    pub sessions: Arc<SessionManager>,
    pub auth: Arc<AuthManager>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: StorageManager,
        api: Arc<dyn ChatApi>,
        identity: Arc<dyn IdentityProvider>,
        sessions: SessionManager,
    ) -> Self {
        let storage = Arc::new(storage);
        let sessions = Arc::new(sessions);
        let chats = Arc::new(ChatRepository::new(storage.clone(), api));
        Self {
            config: Arc::new(config),
            chat_lists: Arc::new(ChatListView::new(chats.clone())),
            auth: Arc::new(AuthManager::new(identity, sessions.clone(), storage.clone())),
            chats,
            sessions,
            storage,
        }
    }

    /// Opens the database and session file under the configured data directory
    /// and wires the HTTP clients.
    pub async fn initialize(config: AppConfig) -> Result<Self, anyhow::Error> {
        log::info!("Initializing app state in {}", config.data_dir.display());
        let storage = StorageManager::open(&config.database_path()).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sessions = SessionManager::load(&config.session_path(), clock).await?;

        let api: Arc<dyn ChatApi> = Arc::new(HttpChatApi::new(&config.api_base_url, config.request_timeout())?);

        // Sign-in calls fail with a provider error until a key is configured.
        let api_key = get_api_key(config.identity_api_key_ref.as_deref()).unwrap_or_else(|e| {
            log::warn!("Identity API key unavailable: {:#}", e);
            String::new()
        });
        let identity: Arc<dyn IdentityProvider> = Arc::new(FirebaseIdentityProvider::new(
            &config.identity_base_url,
            api_key,
            config.request_timeout(),
        )?);

        Ok(Self::new(config, storage, api, identity, sessions))
    }

    /// Opens a conversation screen for an existing chat, or a fresh one when
    /// `chat_id` is `None`.
    pub fn conversation(&self, user_id: &str, chat_id: Option<String>) -> Conversation {
        Conversation::new(self.chats.clone(), user_id, chat_id)
    }

    /// Ends the session and drops the signed-in user's list stream. The chat cache
    /// stays on disk for the next sign-in.
    pub async fn sign_out(&self) {
        if let Some(session) = self.auth.current_session().await {
            self.chat_lists.forget(&session.user_id);
        }
        self.auth.sign_out().await;
    }

    pub async fn shutdown(&self) {
        log::info!("Shutting down, closing database pool");
        self.storage.close().await;
    }
}
