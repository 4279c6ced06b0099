//! Notification stub. Messages are logged and kept in an outbox table; nothing
//! is delivered.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best effort. Implementations must swallow and log their own failures.
    async fn notify(&self, recipient: &str, subject: &str, body: &str);
}

/// Logs every message and appends it to the `notifications` outbox.
pub struct OutboxNotifier {
    pool: SqlitePool,
}

impl OutboxNotifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) {
        info!(recipient, subject, "Notification queued: {body}");
        if let Err(e) = db::insert_notification(&self.pool, recipient, subject, body).await {
            warn!(recipient, subject, "Failed to record notification: {e}");
        }
    }
}
