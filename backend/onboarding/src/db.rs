//! Database layer: migrations, user records, admin credentials and the
//! notification outbox.

use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{debug, info};

use crate::errors::{AppError, Result};
use crate::models::{UserEntry, UserRecord};

/// How many times an optimistic update is retried before giving up.
const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let in_memory = url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }

    // An in-memory database lives and dies with its single connection.
    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    }
    .connect_with(options)
    .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Whole-set access
// ─────────────────────────────────────────────────────────

/// A record together with its credential, as written by [`save`].
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub id: String,
    pub password_hash: String,
    pub record: UserRecord,
}

/// Every record in insertion order. Empty on first run.
pub async fn load(pool: &SqlitePool) -> Result<Vec<UserEntry>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, record FROM users ORDER BY seq ASC")
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|(id, raw)| {
            Ok(UserEntry {
                id,
                record: serde_json::from_str(&raw)?,
            })
        })
        .collect()
}

/// Replace the entire record set in one transaction.
pub async fn save(pool: &SqlitePool, users: &[StoredUser]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM users").execute(&mut *tx).await?;
    for user in users {
        sqlx::query("INSERT INTO users (id, password_hash, record) VALUES (?1, ?2, ?3)")
            .bind(&user.id)
            .bind(&user.password_hash)
            .bind(serde_json::to_string(&user.record)?)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!(count = users.len(), "Record set replaced");
    Ok(())
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// ─────────────────────────────────────────────────────────
// Per-record access
// ─────────────────────────────────────────────────────────

/// Insert a new record. Fails with [`AppError::Conflict`] if `id` is taken.
pub async fn insert_user(
    pool: &SqlitePool,
    id: &str,
    record: &UserRecord,
    password_hash: &str,
) -> Result<()> {
    let rows_affected = sqlx::query(
        "INSERT OR IGNORE INTO users (id, password_hash, record) VALUES (?1, ?2, ?3)",
    )
    .bind(id)
    .bind(password_hash)
    .bind(serde_json::to_string(record)?)
    .execute(pool)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        return Err(AppError::Conflict(format!("user id {id} already exists")));
    }
    Ok(())
}

pub async fn get_user(pool: &SqlitePool, id: &str) -> Result<Option<UserRecord>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT record FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(|(raw,)| serde_json::from_str(&raw).map_err(AppError::from))
        .transpose()
}

/// Load one record, apply `apply`, and write it back if nobody else wrote it
/// in between. `apply` may run more than once.
///
/// Returns `Ok(None)` when `id` is unknown. An error from `apply` aborts the
/// update and leaves the row untouched.
pub async fn update_user<T, F>(pool: &SqlitePool, id: &str, mut apply: F) -> Result<Option<T>>
where
    F: FnMut(&mut UserRecord) -> Result<T>,
{
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT record, version FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        let Some((raw, version)) = row else {
            return Ok(None);
        };

        let mut record: UserRecord = serde_json::from_str(&raw)?;
        let outcome = apply(&mut record)?;

        let rows_affected = sqlx::query(
            "UPDATE users SET record = ?1, version = version + 1 WHERE id = ?2 AND version = ?3",
        )
        .bind(serde_json::to_string(&record)?)
        .bind(id)
        .bind(version)
        .execute(pool)
        .await?
        .rows_affected();

        if rows_affected == 1 {
            return Ok(Some(outcome));
        }
        debug!(user_id = id, attempt, "Concurrent write detected, retrying");
    }

    Err(AppError::Conflict(format!(
        "record {id} kept changing during update"
    )))
}

// ─────────────────────────────────────────────────────────
// Admin credentials
// ─────────────────────────────────────────────────────────

pub async fn upsert_admin(pool: &SqlitePool, username: &str, password_hash: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO admin_credentials (username, password_hash)
        VALUES (?1, ?2)
        ON CONFLICT(username) DO UPDATE
            SET password_hash = excluded.password_hash,
                updated_at    = unixepoch()
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn admin_password_hash(pool: &SqlitePool, username: &str) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT password_hash FROM admin_credentials WHERE username = ?1")
            .bind(username)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(hash,)| hash))
}

// ─────────────────────────────────────────────────────────
// Notification outbox
// ─────────────────────────────────────────────────────────

#[cfg(test)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: i64,
}

pub async fn insert_notification(
    pool: &SqlitePool,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO notifications (recipient, subject, body) VALUES (?1, ?2, ?3)")
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .execute(pool)
        .await?;
    Ok(())
}

/// Outbox entries for one recipient, oldest first.
#[cfg(test)]
pub async fn notifications_for(
    pool: &SqlitePool,
    recipient: &str,
) -> Result<Vec<NotificationRecord>> {
    let rows = sqlx::query_as::<_, NotificationRecord>(
        r#"
        SELECT id, recipient, subject, body, created_at
        FROM   notifications
        WHERE  recipient = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(recipient)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
