//! Administrator credentials: validation of login input, verification against
//! the credential store, and startup provisioning.

use sqlx::SqlitePool;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::AdminBootstrap;
use crate::db;
use crate::errors::{AppError, Result};
use crate::forms::AdminLoginForm;
use crate::password;

/// Validated login input.
///
/// `username` is trimmed and non-empty; `password` is non-empty and kept
/// verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    username: String,
    password: Zeroizing<String>,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginCredentials {
    pub fn try_from_parts(username: &str, password: &str) -> Result<Self> {
        let normalized = username.trim();
        if normalized.is_empty() {
            return Err(AppError::validation("username", "must not be empty"));
        }
        if password.is_empty() {
            return Err(AppError::validation("password", "must not be empty"));
        }
        Ok(Self {
            username: normalized.to_owned(),
            password: Zeroizing::new(password.to_owned()),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl TryFrom<AdminLoginForm> for LoginCredentials {
    type Error = AppError;

    fn try_from(form: AdminLoginForm) -> Result<Self> {
        let password = Zeroizing::new(form.password.unwrap_or_default());
        Self::try_from_parts(form.username.as_deref().unwrap_or_default(), &password)
    }
}

/// Check credentials against the store. Unknown users and wrong passwords are
/// indistinguishable to the caller.
pub async fn authenticate(pool: &SqlitePool, credentials: &LoginCredentials) -> Result<()> {
    let verified = match db::admin_password_hash(pool, credentials.username()).await? {
        Some(stored) => {
            password::verify_blocking(credentials.password.clone(), stored).await?
        }
        None => false,
    };
    if !verified {
        warn!(username = credentials.username(), "Rejected admin login");
        return Err(AppError::InvalidCredentials);
    }
    Ok(())
}

/// Create or rotate the configured admin credential.
pub async fn provision(pool: &SqlitePool, bootstrap: &AdminBootstrap) -> Result<()> {
    let credentials = LoginCredentials::try_from_parts(&bootstrap.username, &bootstrap.password)
        .map_err(|e| AppError::Config(format!("invalid admin bootstrap credential: {e}")))?;
    let password_hash = password::hash_blocking(credentials.password.clone()).await?;
    db::upsert_admin(pool, credentials.username(), &password_hash).await?;
    info!(username = credentials.username(), "Admin credential provisioned");
    Ok(())
}
