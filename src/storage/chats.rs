use super::{now_iso, now_millis, StorageManager};
use crate::models::ChatSummary;
use anyhow::Context;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};

const UPSERT_CHAT_SQL: &str = r#"
    INSERT OR REPLACE INTO chats (
        id, user_id, title, preview, last_message, last_sender,
        message_count, created_at, updated_at, is_starred, last_sync_timestamp
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const SELECT_CHAT_COLUMNS: &str = "SELECT id, title, preview, last_message, last_sender, \
     message_count, created_at, updated_at, is_starred FROM chats";

fn bind_chat<'q>(
    user_id: &'q str,
    chat: &'q ChatSummary,
    synced_at: i64,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    sqlx::query(UPSERT_CHAT_SQL)
        .bind(&chat.id)
        .bind(user_id)
        .bind(&chat.title)
        .bind(&chat.preview)
        .bind(&chat.last_message)
        .bind(&chat.last_sender)
        .bind(chat.message_count)
        .bind(&chat.created_at)
        .bind(&chat.updated_at)
        .bind(chat.is_starred)
        .bind(synced_at)
}

fn row_to_chat(row: &SqliteRow) -> Result<ChatSummary, anyhow::Error> {
    Ok(ChatSummary {
        id: row.try_get("id").context("Failed to read chat id")?,
        title: row.try_get("title").context("Failed to read chat title")?,
        preview: row
            .try_get::<Option<String>, _>("preview")
            .context("Failed to read chat preview")?
            .unwrap_or_default(),
        last_message: row.try_get("last_message").context("Failed to read last_message")?,
        last_sender: row.try_get("last_sender").context("Failed to read last_sender")?,
        message_count: row
            .try_get::<Option<i64>, _>("message_count")
            .context("Failed to read message_count")?
            .unwrap_or(0),
        created_at: row.try_get("created_at").context("Failed to read created_at")?,
        updated_at: row.try_get("updated_at").context("Failed to read updated_at")?,
        is_starred: row
            .try_get::<Option<bool>, _>("is_starred")
            .context("Failed to read is_starred")?
            .unwrap_or(false),
    })
}

impl StorageManager {
    /// Inserts or replaces a single chat row for `user_id`.
    pub async fn upsert_chat(&self, user_id: &str, chat: &ChatSummary) -> Result<(), anyhow::Error> {
        log::debug!("Saving chat {} for user {}", chat.id, user_id);
        bind_chat(user_id, chat, now_millis())
            .execute(&self.pool)
            .await
            .context("Failed to save chat")?;
        Ok(())
    }

    /// Inserts or replaces all `chats` in one transaction; on error nothing is written.
    pub async fn upsert_chats(&self, user_id: &str, chats: &[ChatSummary]) -> Result<(), anyhow::Error> {
        log::debug!("Saving {} chats for user {}", chats.len(), user_id);
        let synced_at = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin chat batch transaction")?;

        for chat in chats {
            bind_chat(user_id, chat, synced_at)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to save chat {}", chat.id))?;
        }

        tx.commit().await.context("Failed to commit chat batch")?;
        log::info!("Saved {} chats for user {}", chats.len(), user_id);
        Ok(())
    }

    /// All cached chats of a user, most recently updated first.
    pub async fn list_chats_by_user(&self, user_id: &str) -> Result<Vec<ChatSummary>, anyhow::Error> {
        let rows = sqlx::query(&format!(
            "{} WHERE user_id = ? ORDER BY updated_at DESC",
            SELECT_CHAT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch chats from database")?;

        let chats = rows
            .iter()
            .map(row_to_chat)
            .collect::<Result<Vec<ChatSummary>, anyhow::Error>>()?;
        log::debug!("Fetched {} cached chats for user {}", chats.len(), user_id);
        Ok(chats)
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatSummary>, anyhow::Error> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_CHAT_COLUMNS))
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch chat from database")?;

        row.as_ref().map(row_to_chat).transpose()
    }

    /// Returns `false` when no chat with `chat_id` exists.
    pub async fn update_chat_title(&self, chat_id: &str, new_title: &str) -> Result<bool, anyhow::Error> {
        log::info!("Renaming cached chat {} to: {}", chat_id, new_title);
        let result = sqlx::query(
            "UPDATE chats SET title = ?, updated_at = ?, last_sync_timestamp = ? WHERE id = ?",
        )
        .bind(new_title)
        .bind(now_iso())
        .bind(now_millis())
        .bind(chat_id)
        .execute(&self.pool)
        .await
        .context("Failed to update chat title in database")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to rename non-existent cached chat: {}", chat_id);
            return Ok(false);
        }
        Ok(true)
    }

    /// Returns `false` when no chat with `chat_id` exists.
    pub async fn update_chat_starred(&self, chat_id: &str, starred: bool) -> Result<bool, anyhow::Error> {
        log::info!("Setting starred={} on cached chat {}", starred, chat_id);
        let result = sqlx::query(
            "UPDATE chats SET is_starred = ?, updated_at = ?, last_sync_timestamp = ? WHERE id = ?",
        )
        .bind(starred)
        .bind(now_iso())
        .bind(now_millis())
        .bind(chat_id)
        .execute(&self.pool)
        .await
        .context("Failed to update chat star status in database")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to star non-existent cached chat: {}", chat_id);
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<bool, anyhow::Error> {
        log::warn!("Deleting cached chat {}", chat_id);
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete chat from database")?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns the number of rows removed.
    pub async fn delete_all_chats_for_user(&self, user_id: &str) -> Result<u64, anyhow::Error> {
        log::warn!("Deleting all cached chats for user {}", user_id);
        let result = sqlx::query("DELETE FROM chats WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user chats from database")?;
        Ok(result.rows_affected())
    }

    pub async fn has_any_chats(&self, user_id: &str) -> Result<bool, anyhow::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cached chats")?;
        Ok(count > 0)
    }
}
