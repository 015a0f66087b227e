// Declare the modules
pub mod api;
pub mod auth;
pub mod chat_list;
pub mod config;
pub mod conversation;
pub mod error;
pub mod markdown;
pub mod models;
pub mod repository;
pub mod session;
pub mod state;
pub mod storage;
pub mod validation;

#[cfg(test)]
mod test_utils;

use auth::Route;
use chat_list::LoadState;
use config::AppConfig;
use state::AppState;

/// Bootstraps the application state, decides the first screen and, for a signed-in
/// user, warms the chat list cache.
pub fn run() -> Result<(), anyhow::Error> {
    // Initialize logging
    env_logger::init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let config = AppConfig::load()?;
        let state = AppState::initialize(config).await?;

        let route = state.auth.startup_route().await;
        log::info!("Startup route: {:?}", route);

        if route == Route::Home {
            if let Some(session) = state.auth.current_session().await {
                state.chat_lists.refresh(&session.user_id, false).await;
                match state.chat_lists.current(&session.user_id) {
                    LoadState::Ready(chats) => log::info!("{} chats available offline", chats.len()),
                    LoadState::Failed(message) => log::warn!("Chat list unavailable: {}", message),
                    _ => {}
                }
            }
        }

        state.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}
