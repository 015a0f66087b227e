use super::{now_millis, StorageManager};
use crate::models::UserProfile;
use anyhow::Context;
use sqlx::Row;

impl StorageManager {
    /// Inserts or replaces the profile row keyed by `user_id`.
    pub async fn upsert_user(&self, user: &UserProfile) -> Result<(), anyhow::Error> {
        log::debug!("Saving profile for user {}", user.user_id);
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO users (
                user_id, email, username, full_name, profile_completed, last_sync_timestamp
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(user.profile_completed)
        .bind(user.last_sync_timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to save user profile")?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, anyhow::Error> {
        let row = sqlx::query(
            r#"
            SELECT user_id, email, username, full_name, profile_completed, last_sync_timestamp
            FROM users
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user profile")?;

        match row {
            Some(r) => Ok(Some(UserProfile {
                user_id: r.try_get("user_id").context("Failed to read user_id")?,
                email: r.try_get("email").context("Failed to read email")?,
                username: r
                    .try_get::<Option<String>, _>("username")
                    .context("Failed to read username")?
                    .unwrap_or_default(),
                full_name: r
                    .try_get::<Option<String>, _>("full_name")
                    .context("Failed to read full_name")?
                    .unwrap_or_default(),
                profile_completed: r
                    .try_get::<Option<bool>, _>("profile_completed")
                    .context("Failed to read profile_completed")?
                    .unwrap_or(false),
                last_sync_timestamp: r
                    .try_get::<Option<i64>, _>("last_sync_timestamp")
                    .context("Failed to read last_sync_timestamp")?
                    .unwrap_or(0),
            })),
            None => Ok(None),
        }
    }

    /// Partial profile edit. Fields passed as `None` keep their value; the profile is
    /// always marked completed. Returns `false` when the user has no row.
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        username: Option<&str>,
        full_name: Option<&str>,
    ) -> Result<bool, anyhow::Error> {
        log::info!("Updating profile for user {}", user_id);
        let result = sqlx::query(
            r#"
            UPDATE users
            SET username = COALESCE(?, username),
                full_name = COALESCE(?, full_name),
                profile_completed = 1,
                last_sync_timestamp = ?
            WHERE user_id = ?
            "#,
        )
        .bind(username)
        .bind(full_name)
        .bind(now_millis())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to update user profile")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to update profile of unknown user: {}", user_id);
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<bool, anyhow::Error> {
        log::warn!("Deleting profile for user {}", user_id);
        let result = sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user profile")?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns the stored profile, creating a blank one on first authentication.
    pub async fn get_or_create_user(&self, user_id: &str, email: &str) -> Result<UserProfile, anyhow::Error> {
        if let Some(existing) = self.get_user(user_id).await? {
            return Ok(existing);
        }
        log::info!("Creating local profile for new user {}", user_id);
        let profile = UserProfile::from_auth(user_id, email);
        self.upsert_user(&profile).await?;
        Ok(profile)
    }
}
