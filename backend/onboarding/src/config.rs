//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the HTTP server
    pub api_port: u16,
    /// Flat directory holding uploaded artifacts
    pub upload_dir: PathBuf,
    /// Upper bound on a single request body, uploads included
    pub max_upload_bytes: usize,
    /// Recipient of workflow notifications
    pub admin_email: String,
    /// Admin credential created or rotated at startup, when both halves are set
    pub admin_bootstrap: Option<AdminBootstrap>,
    /// TON address displayed on the crypto payment page
    pub crypto_wallet_address: String,
    /// Send the session cookie only over HTTPS
    pub cookie_secure: bool,
    /// Legacy `users.json` imported into an empty store
    pub legacy_users_file: Option<PathBuf>,
}

#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let admin_bootstrap = match (env_var("ADMIN_USERNAME"), env_var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(AdminBootstrap {
                username,
                password: Zeroizing::new(password),
            }),
            (Err(_), Err(_)) => None,
            _ => {
                return Err(AppError::Config(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must be set together".to_string(),
                ))
            }
        };

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/onboarding.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid API_PORT".to_string()))?,
            upload_dir: env_var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".to_string())
                .into(),
            max_upload_bytes: env_var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "10485760".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid MAX_UPLOAD_BYTES".to_string()))?,
            admin_email: env_var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@jenxservices.com".to_string()),
            admin_bootstrap,
            crypto_wallet_address: env_var("CRYPTO_WALLET_ADDRESS")
                .unwrap_or_else(|_| "EQCtQdR6B4FcjK...vHwF".to_string()),
            cookie_secure: env_var("COOKIE_SECURE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid COOKIE_SECURE".to_string()))?,
            legacy_users_file: env_var("LEGACY_USERS_FILE").ok().map(PathBuf::from),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("Missing env var: {key}")))
}
