//! Login session and device preferences.
//!
//! Both live in one JSON document next to the database. The session survives a
//! restart only when it was created with remember-me; otherwise it is valid for
//! the lifetime of the process that created it.

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const SESSION_TIMEOUT_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Email,
    Google,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Session {
    pub logged_in: bool,
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub login_method: LoginMethod,
    pub remember_me: bool,
    pub last_login_ms: i64,
    pub expires_at_ms: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Preferences {
    pub onboarding_completed: bool,
    pub theme_mode: ThemeMode,
    pub notifications_enabled: bool,
    pub auto_backup_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            onboarding_completed: false,
            theme_mode: ThemeMode::System,
            notifications_enabled: true,
            auto_backup_enabled: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
struct SessionDocument {
    session: Option<Session>,
    preferences: Preferences,
}

struct SessionState {
    document: SessionDocument,
    created_in_process: bool,
}

pub struct SessionManager {
    path: Option<PathBuf>, // None keeps everything in memory
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
}

fn is_valid(session: &Session, now: i64, created_in_process: bool) -> bool {
    if !session.logged_in {
        return false;
    }
    if session.remember_me {
        now < session.expires_at_ms
    } else {
        created_in_process
    }
}

impl SessionManager {
    /// Opens the session document at `path`. A missing file starts empty; a corrupt
    /// one is logged and replaced on the next write.
    pub async fn load(path: &Path, clock: Arc<dyn Clock>) -> Result<Self, anyhow::Error> {
        let document = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                SessionDocument::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionDocument::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read session file {}", path.display()))
            }
        };
        log::debug!(
            "Loaded session file {} (session present: {})",
            path.display(),
            document.session.is_some()
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            clock,
            state: Mutex::new(SessionState {
                document,
                created_in_process: false,
            }),
        })
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            path: None,
            clock,
            state: Mutex::new(SessionState {
                document: SessionDocument::default(),
                created_in_process: false,
            }),
        }
    }

    async fn persist(&self, document: &SessionDocument) -> Result<(), anyhow::Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create session directory")?;
        }
        let json = serde_json::to_vec_pretty(document).context("Failed to serialize session")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write session file {}", path.display()))?;
        Ok(())
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        display_name: Option<&str>,
        login_method: LoginMethod,
        remember_me: bool,
    ) -> Result<Session, anyhow::Error> {
        let now = self.clock.now_millis();
        let session = Session {
            logged_in: true,
            user_id: user_id.to_string(),
            email: email.to_string(),
            display_name: display_name.map(str::to_string),
            login_method,
            remember_me,
            last_login_ms: now,
            expires_at_ms: now + SESSION_TIMEOUT_MS,
        };
        log::info!(
            "Session created for {} via {:?} (remember me: {})",
            user_id,
            login_method,
            remember_me
        );

        let mut state = self.state.lock().await;
        state.document.session = Some(session.clone());
        state.created_in_process = true;
        self.persist(&state.document).await?;
        Ok(session)
    }

    /// Whether a usable session exists right now. An invalid session found here is
    /// cleared.
    pub async fn is_logged_in(&self) -> bool {
        self.valid_session().await.is_some()
    }

    async fn valid_session(&self) -> Option<Session> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().await;
        let session = state.document.session.clone()?;
        if is_valid(&session, now, state.created_in_process) {
            return Some(session);
        }

        log::info!("Clearing stale session for {}", session.user_id);
        state.document.session = None;
        state.created_in_process = false;
        if let Err(e) = self.persist(&state.document).await {
            log::error!("Failed to persist cleared session: {:#}", e);
        }
        None
    }

    /// Pushes the expiry of a valid remember-me session another full timeout ahead.
    pub async fn extend_session(&self) -> Result<bool, anyhow::Error> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().await;
        let created_in_process = state.created_in_process;
        let Some(session) = state.document.session.as_mut() else {
            return Ok(false);
        };
        if !session.remember_me || !is_valid(session, now, created_in_process) {
            return Ok(false);
        }
        session.expires_at_ms = now + SESSION_TIMEOUT_MS;
        log::debug!("Session for {} extended", session.user_id);
        self.persist(&state.document).await?;
        Ok(true)
    }

    pub async fn user_details(&self) -> Option<Session> {
        self.valid_session().await
    }

    /// Updates the cached name and/or email of the current session.
    pub async fn update_user_session(
        &self,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<bool, anyhow::Error> {
        let mut state = self.state.lock().await;
        let Some(session) = state.document.session.as_mut() else {
            log::warn!("No session to update");
            return Ok(false);
        };
        if let Some(name) = display_name {
            session.display_name = Some(name.to_string());
        }
        if let Some(email) = email {
            session.email = email.to_string();
        }
        self.persist(&state.document).await?;
        Ok(true)
    }

    /// Ends the session. Preferences are kept.
    pub async fn logout(&self) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock().await;
        if let Some(session) = &state.document.session {
            log::info!("Logging out {}", session.user_id);
        }
        state.document.session = None;
        state.created_in_process = false;
        self.persist(&state.document).await
    }

    pub async fn preferences(&self) -> Preferences {
        self.state.lock().await.document.preferences.clone()
    }

    pub async fn update_preferences<F>(&self, edit: F) -> Result<Preferences, anyhow::Error>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut state = self.state.lock().await;
        edit(&mut state.document.preferences);
        self.persist(&state.document).await?;
        Ok(state.document.preferences.clone())
    }
}
