//! Onboarding service entry point.
//!
//! Serves the multi-step onboarding and payment-verification flow (register,
//! choose a payment method, upload proofs, receipt, crypto proof, final
//! validation) and the admin review console, backed by SQLite.

mod admin;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod forms;
mod legacy;
mod models;
mod notify;
mod password;
mod session;
mod uploads;
mod workflow;

#[cfg(test)]
mod test_admin;
#[cfg(test)]
mod test_workflow;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::{MemoryStore, SessionManagerLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::AppState;
use config::Config;
use notify::OutboxNotifier;
use uploads::UploadSink;

/// Assemble every route with its layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let session_layer =
        SessionManagerLayer::new(MemoryStore::default()).with_secure(state.config.cookie_secure);

    // Stored artifacts are only visible to the administrator.
    let artifacts = Router::new()
        .nest_service("/uploads", ServeDir::new(state.uploads.dir()))
        .layer(middleware::from_fn(admin::require_admin_session));

    Router::new()
        .route("/health", get(api::health))
        // ─── User flow ────────────────────────────────────
        .route("/", get(api::index))
        .route("/register", post(api::register))
        .route("/payment_choice", get(api::payment_choice))
        .route("/submit_payment_method", post(api::submit_payment_method))
        .route("/dynamic_form_card", get(api::dynamic_form_card))
        .route("/upload_card_details", post(api::upload_card_details))
        .route("/dynamic_form_ticket", get(api::dynamic_form_ticket))
        .route("/upload_ticket_details", post(api::upload_ticket_details))
        .route("/waiting_page", get(api::waiting_page))
        .route("/complementary_payment", get(api::complementary_payment))
        .route(
            "/submit_complementary_payment",
            post(api::submit_complementary_payment),
        )
        .route("/receipt", get(api::receipt))
        .route("/submit_receipt", post(api::submit_receipt))
        .route("/crypto_payment", get(api::crypto_payment))
        .route("/submit_crypto_payment", post(api::submit_crypto_payment))
        .route("/final_validation", get(api::final_validation))
        .route("/submit_final_validation", post(api::submit_final_validation))
        .route("/confirmation", get(api::confirmation))
        // ─── Admin console ────────────────────────────────
        .route("/admin_login", get(admin::login_page).post(admin::login))
        .route("/admin_dashboard", get(admin::dashboard))
        .route("/admin_user_details/:user_id", get(admin::user_details))
        .route(
            "/admin_update_user_status/:user_id",
            post(admin::update_user_status),
        )
        .route("/admin_logout", get(admin::logout))
        .merge(artifacts)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load optional .env file (ignored if missing) before anything reads env.
    let _ = dotenvy::dotenv();

    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    if let Some(bootstrap) = &config.admin_bootstrap {
        auth::provision(&pool, bootstrap).await?;
    }
    if let Some(path) = &config.legacy_users_file {
        legacy::import_if_empty(&pool, path).await?;
    }

    let uploads = UploadSink::open(&config.upload_dir).await?;
    let notifier = Arc::new(OutboxNotifier::new(pool.clone()));

    let addr = format!("0.0.0.0:{}", config.api_port);
    let state = Arc::new(AppState {
        pool,
        uploads,
        notifier,
        config,
    });
    let app = build_router(state);

    info!("Onboarding service listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
