//! Admin review: login, record listing and detail, validate/reject decisions.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::{Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::{AppState, FormPage};
use crate::auth::{self, LoginCredentials};
use crate::db;
use crate::errors::{AppError, Result};
use crate::forms::{AdminLoginForm, Decision, DecisionForm};
use crate::models::{AdminStatus, UserEntry, UserRecord};
use crate::session::SessionContext;
use crate::uploads;

#[derive(Serialize)]
pub struct DashboardResponse {
    pub count: usize,
    pub users: Vec<UserEntry>,
}

/// A stored artifact resolved to a retrievable location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLink {
    pub stage: &'static str,
    pub field: &'static str,
    pub filename: String,
    pub url: String,
}

#[derive(Serialize)]
pub struct UserDetailResponse {
    #[serde(flatten)]
    pub user: UserEntry,
    pub artifacts: Vec<ArtifactLink>,
}

/// Resolve every artifact the record references, stage by stage.
pub fn artifact_links(record: &UserRecord) -> Vec<ArtifactLink> {
    let mut found: Vec<(&'static str, &'static str, &str)> = Vec::new();
    if let Some(details) = &record.payment_details {
        found.extend(details.artifacts().into_iter().map(|(f, n)| ("payment", f, n)));
    }
    if let Some(details) = &record.complementary_payment_details {
        found.extend(
            details
                .artifacts()
                .into_iter()
                .map(|(f, n)| ("complementary_payment", f, n)),
        );
    }
    if let Some(proof) = &record.crypto_payment_proof {
        found.push(("crypto_payment", "crypto_payment_proof", proof.as_str()));
    }
    if let Some(photo) = record
        .final_validation_details
        .as_ref()
        .and_then(|d| d.final_photo.as_deref())
    {
        found.push(("final_validation", "final_photo", photo));
    }

    found
        .into_iter()
        // Names that could not have come from the upload sink are not linked.
        .filter(|(_, _, name)| uploads::is_plain_name(name))
        .map(|(stage, field, name)| ArtifactLink {
            stage,
            field,
            filename: name.to_string(),
            url: format!("/uploads/{name}"),
        })
        .collect()
}

fn decision_notice(decision: Decision, first_name: &str) -> (&'static str, String) {
    match decision {
        Decision::Validate => (
            "Your JenX Services payment has been validated!",
            format!(
                "Dear {first_name},\n\nYour payment has been validated by our team. \
                 You can now proceed to the next step of your service.\n\n\
                 Kind regards,\nThe JenX Services team"
            ),
        ),
        Decision::Reject => (
            "Update regarding your JenX Services payment",
            format!(
                "Dear {first_name},\n\nWe ran into a problem while verifying your payment. \
                 Please log in to your account for details or contact support.\n\n\
                 Kind regards,\nThe JenX Services team"
            ),
        ),
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// Guards routes that only the administrator may reach.
pub async fn require_admin_session(
    session: SessionContext,
    request: Request,
    next: Next,
) -> Result<Response> {
    session.require_admin().await?;
    Ok(next.run(request).await)
}

/// `GET /admin_login`
pub async fn login_page() -> Json<FormPage> {
    Json(FormPage {
        page: "admin_login",
        action: "/admin_login",
        currency: None,
        payment_method: None,
        fields: &["username", "password"],
        files: &[],
    })
}

/// `POST /admin_login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<AdminLoginForm>,
) -> Result<Redirect> {
    let credentials = LoginCredentials::try_from(form)?;
    auth::authenticate(&state.pool, &credentials).await?;
    session.start_admin(credentials.username()).await?;
    info!(username = credentials.username(), "Admin logged in");
    Ok(Redirect::to("/admin_dashboard"))
}

/// `GET /admin_dashboard`
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<DashboardResponse>> {
    session.require_admin().await?;
    let users = db::load(&state.pool).await?;
    Ok(Json(DashboardResponse {
        count: users.len(),
        users,
    }))
}

/// `GET /admin_user_details/:user_id`
pub async fn user_details(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Path(user_id): Path<String>,
) -> Result<Json<UserDetailResponse>> {
    session.require_admin().await?;
    let record = db::get_user(&state.pool, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;
    let artifacts = artifact_links(&record);
    Ok(Json(UserDetailResponse {
        user: UserEntry {
            id: user_id,
            record,
        },
        artifacts,
    }))
}

/// `POST /admin_update_user_status/:user_id`
///
/// An unknown `user_id` is ignored and only logged.
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Path(user_id): Path<String>,
    Form(form): Form<DecisionForm>,
) -> Result<Redirect> {
    let admin = session.require_admin().await?;
    let decision = form.validate()?;
    let now = Utc::now();

    let decided = db::update_user(&state.pool, &user_id, |record| {
        record.admin_status = match decision {
            Decision::Validate => AdminStatus::Validated,
            Decision::Reject => AdminStatus::Rejected,
        };
        record.updated_at = now;
        Ok((record.email.clone(), record.first_name.clone()))
    })
    .await?;

    match decided {
        Some((email, first_name)) => {
            info!(user_id = %user_id, admin = %admin, ?decision, "Admin decision recorded");
            let (subject, body) = decision_notice(decision, &first_name);
            state.notifier.notify(&email, subject, &body).await;
        }
        None => warn!(user_id = %user_id, admin = %admin, ?decision, "Decision for unknown user ignored"),
    }

    Ok(Redirect::to("/admin_dashboard"))
}

/// `GET /admin_logout`
pub async fn logout(session: SessionContext) -> Result<Redirect> {
    session.end_admin().await?;
    Ok(Redirect::to("/admin_login"))
}
