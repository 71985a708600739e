//! Users with a linked remote account, their plays and the sync watermark.
//!
//! Play timestamps are stored as epoch milliseconds; user timestamps as
//! RFC 3339 text.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor};

/// Watermark of a user that has never been synced.
pub const NEVER_SYNCED_SECS: i64 = -2_208_988_799; // 1900-01-01T00:00:01Z

/// Watermark of a user that has never been synced.
pub fn never_synced() -> DateTime<Utc> {
    DateTime::from_timestamp(NEVER_SYNCED_SECS, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub token_expires_at: Option<String>,
    pub last_synced_at: Option<String>,
}

/// Remote credential stored for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A user whose remote account is linked, as seen by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedUser {
    pub id: i64,
    pub username: String,
    pub credential: Credential,
}

impl UserRow {
    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at.as_deref().and_then(parse_rfc3339)
    }

    /// Convert into a [`LinkedUser`] if a refresh token is stored.
    pub fn into_linked(self) -> Option<LinkedUser> {
        let refresh_token = self.refresh_token.filter(|t| !t.is_empty())?;
        Some(LinkedUser {
            id: self.id,
            username: self.username,
            credential: Credential {
                refresh_token,
                access_token: self.access_token,
                expires_at: self.token_expires_at.as_deref().and_then(parse_rfc3339),
            },
        })
    }
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

const USER_COLUMNS: &str =
    "id, username, refresh_token, access_token, token_expires_at, last_synced_at";

// ============================================================================
// Users
// ============================================================================

/// Create a user and return its id.
pub async fn create_user<'e, E>(executor: E, username: &str) -> sqlx::Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?)")
        .bind(username)
        .bind(Utc::now().to_rfc3339())
        .execute(executor)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_user_by_name<'e, E>(executor: E, username: &str) -> sqlx::Result<Option<UserRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
        .bind(username)
        .fetch_optional(executor)
        .await
}

pub async fn list_users<'e, E>(executor: E) -> sqlx::Result<Vec<UserRow>>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
        .fetch_all(executor)
        .await
}

/// Users with a stored refresh token.
pub async fn linked_users<'e, E>(executor: E) -> sqlx::Result<Vec<LinkedUser>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE refresh_token IS NOT NULL AND refresh_token != '' ORDER BY id"
    ))
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().filter_map(UserRow::into_linked).collect())
}

/// Link a remote account by storing its refresh token. Any cached access
/// token is dropped.
pub async fn link_user<'e, E>(executor: E, user_id: i64, refresh_token: &str) -> sqlx::Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE users SET refresh_token = ?, access_token = NULL, token_expires_at = NULL \
         WHERE id = ?",
    )
    .bind(refresh_token)
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Persist a refreshed access token (and a rotated refresh token, if any).
pub async fn store_tokens<'e, E>(
    executor: E,
    user_id: i64,
    credential: &Credential,
) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "UPDATE users SET refresh_token = ?, access_token = ?, token_expires_at = ? WHERE id = ?",
    )
    .bind(&credential.refresh_token)
    .bind(&credential.access_token)
    .bind(credential.expires_at.map(|t| t.to_rfc3339()))
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Last successful sync, or [`never_synced`].
pub async fn watermark<'e, E>(executor: E, user_id: i64) -> sqlx::Result<DateTime<Utc>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT last_synced_at FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(executor)
            .await?;
    Ok(row
        .and_then(|(raw,)| raw)
        .as_deref()
        .and_then(parse_rfc3339)
        .unwrap_or_else(never_synced))
}

pub async fn set_watermark<'e, E>(executor: E, user_id: i64, at: DateTime<Utc>) -> sqlx::Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE users SET last_synced_at = ? WHERE id = ?")
        .bind(at.to_rfc3339())
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

// ============================================================================
// Plays
// ============================================================================

/// Timestamp of the user's most recent stored play.
pub async fn latest_play<'e, E>(executor: E, user_id: i64) -> sqlx::Result<Option<DateTime<Utc>>>
where
    E: SqliteExecutor<'e>,
{
    let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(played_at) FROM plays WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(executor)
        .await?;
    Ok(row.0.and_then(DateTime::from_timestamp_millis))
}

/// Store a play. Returns `false` if one already exists at that instant.
pub async fn insert_play<'e, E>(
    executor: E,
    user_id: i64,
    track_id: &str,
    played_at: DateTime<Utc>,
) -> sqlx::Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO plays (user_id, track_id, played_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(track_id)
    .bind(played_at.timestamp_millis())
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn play_count<'e, E>(executor: E, user_id: i64) -> sqlx::Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plays WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(executor)
        .await?;
    Ok(n)
}

/// Most recent plays as `(track_id, played_at)`, newest first.
pub async fn recent_plays<'e, E>(
    executor: E,
    user_id: i64,
    limit: u32,
) -> sqlx::Result<Vec<(String, DateTime<Utc>)>>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT track_id, played_at FROM plays WHERE user_id = ? \
         ORDER BY played_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit as i64)
    .fetch_all(executor)
    .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, ms)| DateTime::from_timestamp_millis(ms).map(|t| (id, t)))
        .collect())
}
