//! One-shot import of the legacy `users.json` document.
//!
//! The legacy document maps user ids to loosely typed records: ages are
//! strings, passwords are plaintext, payment details carry no method tag and
//! unset fields are `null`. Records are converted, passwords hashed, and the
//! whole set written with [`db::save`].

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, StoredUser};
use crate::errors::Result;
use crate::models::{
    AdminStatus, CardDetails, FinalValidationDetails, PaymentDetails, PaymentMethod, TicketDetails,
    UserRecord, WorkflowStatus,
};
use crate::password;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyUser {
    name: Option<String>,
    first_name: Option<String>,
    age: Option<Value>,
    email: Option<String>,
    password: Option<String>,
    currency: Option<String>,
    status: Option<WorkflowStatus>,
    admin_status: Option<AdminStatus>,
    registration_date: Option<String>,
    payment_method: Option<PaymentMethod>,
    payment_details: Option<Value>,
    complementary_payment_details: Option<Value>,
    complementary_payment_confirmed: Option<bool>,
    receipt_code: Option<String>,
    crypto_payment_proof: Option<String>,
    final_validation_details: Option<Value>,
}

/// Import `path` when the store holds no records yet. Returns the number of
/// records written.
pub async fn import_if_empty(pool: &SqlitePool, path: &Path) -> Result<usize> {
    if db::count_users(pool).await? > 0 {
        info!(path = %path.display(), "Store already populated; skipping legacy import");
        return Ok(0);
    }
    let raw = tokio::fs::read_to_string(path).await?;
    let now = Utc::now();
    // Every record hashes a password; keep that off the async workers.
    let users = tokio::task::spawn_blocking(move || parse(&raw, now)).await??;
    db::save(pool, &users).await?;
    info!(path = %path.display(), count = users.len(), "Legacy records imported");
    Ok(users.len())
}

/// Convert a legacy document, ordered by registration date.
pub fn parse(raw: &str, now: DateTime<Utc>) -> Result<Vec<StoredUser>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: Map<String, Value> = serde_json::from_str(raw)?;

    let mut users = Vec::with_capacity(document.len());
    for (id, value) in document {
        let legacy: LegacyUser = serde_json::from_value(strip_nulls(value))?;
        users.push(convert(id, legacy, now));
    }
    users.sort_by_key(|u| u.record.registration_date);
    Ok(users)
}

fn convert(id: String, legacy: LegacyUser, now: DateTime<Utc>) -> StoredUser {
    let registration_date = legacy
        .registration_date
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(now);

    let age = match &legacy.age {
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        _ => None,
    }
    .unwrap_or_else(|| {
        warn!(user_id = %id, "Legacy record has no usable age");
        0
    });

    let initial = payment_details(&id, legacy.payment_method, legacy.payment_details);
    // The legacy flow let users switch method after uploading, so the stored
    // details win over the stored method.
    let method = match (&initial, legacy.payment_method) {
        (Some(details), Some(stated)) if details.method() != stated => {
            warn!(
                user_id = %id,
                stated = stated.as_str(),
                found = details.method().as_str(),
                "Legacy payment method disagrees with its details; keeping the details' method"
            );
            Some(details.method())
        }
        (Some(details), None) => Some(details.method()),
        (_, stated) => stated,
    };
    let status = match (legacy.status.unwrap_or(WorkflowStatus::Registered), method) {
        (WorkflowStatus::Registered, Some(_)) => WorkflowStatus::PaymentMethodChosen,
        (WorkflowStatus::TicketDetailsSubmitted, Some(PaymentMethod::Card)) => {
            WorkflowStatus::CardDetailsSubmitted
        }
        (WorkflowStatus::CardDetailsSubmitted, Some(PaymentMethod::Ticket)) => {
            WorkflowStatus::TicketDetailsSubmitted
        }
        (status, _) => status,
    };

    let record = UserRecord {
        name: legacy.name.unwrap_or_default(),
        first_name: legacy.first_name.unwrap_or_default(),
        age,
        email: legacy.email.unwrap_or_default(),
        currency: legacy.currency.unwrap_or_else(|| "€".to_string()),
        status,
        admin_status: legacy.admin_status.unwrap_or_default(),
        registration_date,
        updated_at: now,
        payment_method: method,
        payment_details: initial,
        complementary_payment_details: payment_details(
            &id,
            method,
            legacy.complementary_payment_details,
        ),
        complementary_payment_confirmed: legacy.complementary_payment_confirmed.unwrap_or(false),
        receipt_code: legacy.receipt_code,
        // The legacy flow never stored when the code was generated.
        receipt_generated_at: None,
        crypto_payment_proof: legacy.crypto_payment_proof,
        final_validation_details: legacy
            .final_validation_details
            .and_then(|v| serde_json::from_value::<FinalValidationDetails>(v).ok()),
    };

    // Accounts without a password get one nobody knows.
    let password_hash = match legacy.password.as_deref() {
        Some(plain) if !plain.is_empty() => password::hash(plain),
        _ => password::hash(&Uuid::new_v4().to_string()),
    };

    StoredUser {
        id,
        password_hash,
        record,
    }
}

/// Interpret untagged legacy details. The object's own keys decide the
/// variant; `method` is only consulted when they are inconclusive.
fn payment_details(
    id: &str,
    method: Option<PaymentMethod>,
    value: Option<Value>,
) -> Option<PaymentDetails> {
    let value = value.filter(|v| v.as_object().is_some_and(|m| !m.is_empty()))?;
    let kind = value.as_object().and_then(shape_of).or(method)?;
    let parsed = match kind {
        PaymentMethod::Card => serde_json::from_value::<CardDetails>(value).map(PaymentDetails::Card),
        PaymentMethod::Ticket => {
            serde_json::from_value::<TicketDetails>(value).map(PaymentDetails::Ticket)
        }
    };
    parsed
        .map_err(|e| warn!(user_id = id, "Dropping unreadable legacy payment details: {e}"))
        .ok()
}

fn shape_of(details: &Map<String, Value>) -> Option<PaymentMethod> {
    const CARD_KEYS: &[&str] = &["recto_photo", "verso_photo", "number", "date"];
    const TICKET_KEYS: &[&str] = &["ticket_photo", "expiration"];
    let has_any = |keys: &[&str]| keys.iter().any(|k| details.contains_key(*k));
    match (has_any(CARD_KEYS), has_any(TICKET_KEYS)) {
        (true, false) => Some(PaymentMethod::Card),
        (false, true) => Some(PaymentMethod::Ticket),
        _ => None,
    }
}

/// Python's `isoformat()`, naive local time, read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Drop `null` members recursively so serde defaults apply.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}
