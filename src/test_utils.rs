//! In-process doubles shared by the unit tests.

use crate::api::{
    AckResponse, ChatApi, ChatMessagesResponse, CreateChatResponse, ListChatsResponse,
    SendChatMessageResponse, SendQueryResponse,
};
use crate::auth::{AuthErrorKind, Identity, IdentityError, IdentityProvider};
use crate::error::ApiError;
use crate::models::{ChatMessage, ChatSummary};
use crate::session::Clock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn summary(id: &str, title: &str) -> ChatSummary {
    ChatSummary {
        id: id.to_string(),
        title: title.to_string(),
        preview: format!("About {}", title),
        last_message: None,
        last_sender: None,
        message_count: 0,
        created_at: Some("2024-05-01T10:00:00.000Z".to_string()),
        updated_at: Some("2024-05-01T10:00:00.000Z".to_string()),
        is_starred: false,
    }
}

/// How every call of [`FakeChatApi`] answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FakeMode {
    Ok,
    /// 2xx with `success: false`
    Reject,
    Http(u16),
    Transport,
}

struct FakeState {
    mode: FakeMode,
    chats: Vec<ChatSummary>,
    messages: Vec<ChatMessage>,
    reply: Option<String>,
    next_chat_id: Option<String>,
    rejection: String,
    created: usize,
    calls: HashMap<&'static str, usize>,
    list_gate: Option<Arc<Notify>>,
}

/// Scripted chat backend that keeps a server-side chat list in memory and
/// counts calls per endpoint.
pub struct FakeChatApi {
    state: Mutex<FakeState>,
}

impl Default for FakeChatApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                mode: FakeMode::Ok,
                chats: Vec::new(),
                messages: Vec::new(),
                reply: None,
                next_chat_id: None,
                rejection: String::new(),
                created: 0,
                calls: HashMap::new(),
                list_gate: None,
            }),
        }
    }
}

impl FakeChatApi {
    pub fn set_mode(&self, mode: FakeMode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn set_server_chats(&self, chats: Vec<ChatSummary>) {
        self.state.lock().unwrap().chats = chats;
    }

    pub fn set_messages(&self, messages: Vec<ChatMessage>) {
        self.state.lock().unwrap().messages = messages;
    }

    pub fn set_reply(&self, reply: &str) {
        self.state.lock().unwrap().reply = Some(reply.to_string());
    }

    pub fn set_next_chat_id(&self, id: &str) {
        self.state.lock().unwrap().next_chat_id = Some(id.to_string());
    }

    /// Message carried by list responses in [`FakeMode::Reject`].
    pub fn set_rejection(&self, message: &str) {
        self.state.lock().unwrap().rejection = message.to_string();
    }

    /// Makes the next `list_chats` call wait until the returned gate is notified.
    pub fn hold_next_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().list_gate = Some(gate.clone());
        gate
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    // Records the call; Ok(false) means answer with success=false.
    fn begin(&self, endpoint: &'static str) -> Result<bool, ApiError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(endpoint).or_insert(0) += 1;
        match state.mode {
            FakeMode::Ok => Ok(true),
            FakeMode::Reject => Ok(false),
            FakeMode::Http(status) => Err(ApiError::Http {
                status,
                message: "Internal Server Error".to_string(),
            }),
            FakeMode::Transport => Err(ApiError::Transport("connection refused".to_string())),
        }
    }

    fn create_remote(&self, title: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.created += 1;
        let id = state
            .next_chat_id
            .take()
            .unwrap_or_else(|| format!("chat-{}", state.created));
        state.chats.insert(0, summary(&id, title));
        id
    }

    // Server text sent with success=false, empty unless scripted.
    fn rejection_message(&self, success: bool) -> String {
        if success {
            String::new()
        } else {
            self.state.lock().unwrap().rejection.clone()
        }
    }

    fn ack(success: bool, message: &str) -> AckResponse {
        AckResponse {
            success,
            message: if success { message.to_string() } else { String::new() },
        }
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn list_chats(&self, _user_id: &str) -> Result<ListChatsResponse, ApiError> {
        let gate = self.state.lock().unwrap().list_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let success = self.begin("list_chats")?;
        let rejection_message = self.rejection_message(success);
        let chats = if success {
            self.state.lock().unwrap().chats.clone()
        } else {
            Vec::new()
        };
        Ok(ListChatsResponse {
            success,
            total_chats: chats.len(),
            chats,
            message: rejection_message,
        })
    }

    async fn create_chat(&self, _user_id: &str, title: &str) -> Result<CreateChatResponse, ApiError> {
        if !self.begin("create_chat")? {
            return Ok(CreateChatResponse {
                success: false,
                message: String::new(),
                chat_id: String::new(),
            });
        }
        let chat_id = self.create_remote(title);
        Ok(CreateChatResponse {
            success: true,
            message: "Chat created successfully".to_string(),
            chat_id,
        })
    }

    async fn delete_chat(&self, _user_id: &str, chat_id: &str) -> Result<(), ApiError> {
        self.begin("delete_chat")?;
        self.state.lock().unwrap().chats.retain(|c| c.id != chat_id);
        Ok(())
    }

    async fn rename_chat(&self, _user_id: &str, chat_id: &str, title: &str) -> Result<AckResponse, ApiError> {
        let success = self.begin("rename_chat")?;
        if success {
            let mut state = self.state.lock().unwrap();
            if let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) {
                chat.title = title.to_string();
            }
        }
        Ok(Self::ack(success, "Chat renamed successfully"))
    }

    async fn star_chat(&self, _user_id: &str, chat_id: &str, starred: bool) -> Result<AckResponse, ApiError> {
        let success = self.begin("star_chat")?;
        if success {
            let mut state = self.state.lock().unwrap();
            if let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) {
                chat.is_starred = starred;
            }
        }
        Ok(Self::ack(success, "Chat starred successfully"))
    }

    async fn list_messages(&self, _user_id: &str, _chat_id: &str) -> Result<ChatMessagesResponse, ApiError> {
        let success = self.begin("list_messages")?;
        let messages = if success {
            self.state.lock().unwrap().messages.clone()
        } else {
            Vec::new()
        };
        Ok(ChatMessagesResponse {
            success,
            messages,
            message: self.rejection_message(success),
        })
    }

    async fn send_chat_message(
        &self,
        _user_id: &str,
        chat_id: &str,
        _message: &str,
    ) -> Result<SendChatMessageResponse, ApiError> {
        let success = self.begin("send_chat_message")?;
        let response = if success {
            self.state.lock().unwrap().reply.clone()
        } else {
            None
        };
        Ok(SendChatMessageResponse {
            success,
            message: String::new(),
            response,
            chat_id: chat_id.to_string(),
        })
    }

    async fn send_query(&self, _user_id: &str, query: &str) -> Result<SendQueryResponse, ApiError> {
        if !self.begin("send_query")? {
            return Ok(SendQueryResponse {
                success: false,
                message: String::new(),
                response: None,
                chat_id: None,
            });
        }
        let chat_id = self.create_remote(query);
        let response = self.state.lock().unwrap().reply.clone();
        Ok(SendQueryResponse {
            success: true,
            message: String::new(),
            response,
            chat_id: Some(chat_id),
        })
    }

    async fn submit_feedback(&self, _user_id: &str, _feedback: &str) -> Result<AckResponse, ApiError> {
        let success = self.begin("submit_feedback")?;
        Ok(Self::ack(success, "Feedback saved successfully"))
    }
}

/// Clock the tests move by hand.
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Identity provider that accepts one known account, or fails every call with
/// a fixed error kind.
pub struct FakeIdentityProvider {
    pub failure: Mutex<Option<AuthErrorKind>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Default for FakeIdentityProvider {
    fn default() -> Self {
        Self {
            failure: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeIdentityProvider {
    pub fn fail_with(&self, kind: AuthErrorKind) {
        *self.failure.lock().unwrap() = Some(kind);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    fn begin(&self, method: &'static str) -> Result<(), IdentityError> {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
        match *self.failure.lock().unwrap() {
            Some(kind) => Err(IdentityError::new(kind, "scripted failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<Identity, IdentityError> {
        self.begin("sign_up")?;
        Ok(Identity {
            user_id: "uid-1".to_string(),
            email: email.to_string(),
            display_name: None,
        })
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<Identity, IdentityError> {
        self.begin("sign_in")?;
        Ok(Identity {
            user_id: "uid-1".to_string(),
            email: email.to_string(),
            display_name: None,
        })
    }

    async fn sign_in_with_google(&self, _id_token: &str) -> Result<Identity, IdentityError> {
        self.begin("sign_in_with_google")?;
        Ok(Identity {
            user_id: "uid-g".to_string(),
            email: "pet.owner@gmail.com".to_string(),
            display_name: Some("Pet Owner".to_string()),
        })
    }

    async fn send_password_reset(&self, _email: &str) -> Result<(), IdentityError> {
        self.begin("send_password_reset")
    }

    async fn change_password(
        &self,
        _email: &str,
        _current_password: &str,
        _new_password: &str,
    ) -> Result<(), IdentityError> {
        self.begin("change_password")
    }
}
