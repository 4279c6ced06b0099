//! Session helpers to keep HTTP handlers free of session-store details.
//!
//! A user session carries `{user_id, currency}`; an admin session carries
//! `{admin_logged_in, admin_username}`. Both can coexist in one cookie.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::warn;

use crate::db;
use crate::errors::{AppError, Result};
use crate::models::UserRecord;

pub(crate) const USER_ID_KEY: &str = "user_id";
pub(crate) const CURRENCY_KEY: &str = "currency";
pub(crate) const ADMIN_FLAG_KEY: &str = "admin_logged_in";
pub(crate) const ADMIN_USERNAME_KEY: &str = "admin_username";

const DEFAULT_CURRENCY: &str = "€";

#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// Bind a freshly registered user to this session.
    pub async fn start_user(&self, user_id: &str, currency: &str) -> Result<()> {
        self.0.insert(USER_ID_KEY, user_id).await?;
        self.0.insert(CURRENCY_KEY, currency).await?;
        Ok(())
    }

    /// The user id, or [`AppError::SessionMissing`].
    pub async fn require_user_id(&self) -> Result<String> {
        self.0
            .get::<String>(USER_ID_KEY)
            .await?
            .ok_or(AppError::SessionMissing)
    }

    /// Resolve the session's user against the store.
    ///
    /// A session pointing at a record that no longer exists is cleared and
    /// reported as [`AppError::SessionInvalid`].
    pub async fn require_user(&self, pool: &SqlitePool) -> Result<(String, UserRecord)> {
        let user_id = self.require_user_id().await?;
        match db::get_user(pool, &user_id).await? {
            Some(record) => Ok((user_id, record)),
            None => {
                self.invalidate_user(&user_id).await?;
                Err(AppError::SessionInvalid)
            }
        }
    }

    /// Drop the user keys after the store reported the user as unknown.
    pub async fn invalidate_user(&self, user_id: &str) -> Result<()> {
        warn!(user_id, "Session refers to a missing record; clearing it");
        self.0.remove::<String>(USER_ID_KEY).await?;
        self.0.remove::<String>(CURRENCY_KEY).await?;
        Ok(())
    }

    pub async fn currency(&self) -> Result<String> {
        Ok(self
            .0
            .get::<String>(CURRENCY_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()))
    }

    /// Mark the session as an admin session, rotating the session id.
    pub async fn start_admin(&self, username: &str) -> Result<()> {
        self.0.cycle_id().await?;
        self.0.insert(ADMIN_FLAG_KEY, true).await?;
        self.0.insert(ADMIN_USERNAME_KEY, username).await?;
        Ok(())
    }

    /// The admin username, or [`AppError::AdminRequired`].
    pub async fn require_admin(&self) -> Result<String> {
        let logged_in = self.0.get::<bool>(ADMIN_FLAG_KEY).await?.unwrap_or(false);
        if !logged_in {
            return Err(AppError::AdminRequired);
        }
        Ok(self
            .0
            .get::<String>(ADMIN_USERNAME_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn end_admin(&self) -> Result<()> {
        self.0.remove::<bool>(ADMIN_FLAG_KEY).await?;
        self.0.remove::<String>(ADMIN_USERNAME_KEY).await?;
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = <Session as FromRequestParts<S>>::Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        Session::from_request_parts(parts, state).await.map(Self::new)
    }
}
