//! Inbound form handling: multipart collection and the validation layer that
//! turns raw fields into typed submissions before anything is mutated.

use std::collections::HashMap;

use axum::{body::Bytes, extract::Multipart};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::errors::{AppError, Result};
use crate::models::{CardDetails, FinalValidationDetails, PaymentMethod, TicketDetails};

// ─────────────────────────────────────────────────────────
// Multipart bodies
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// A multipart body split into text fields and files.
#[derive(Debug, Default)]
pub struct SubmittedForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl SubmittedForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let filename = field.file_name().map(str::to_string);
            match filename {
                // Browsers send an empty part with no filename for unused file inputs.
                Some(filename) if filename.is_empty() => {}
                Some(filename) => {
                    let bytes = field.bytes().await?;
                    form.files.insert(name, UploadedFile { filename, bytes });
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    pub fn required(&self, name: &str) -> Result<String> {
        required(name, self.fields.get(name).map(String::as_str))
    }

    pub fn amount(&self, name: &str) -> Result<String> {
        amount(name, self.fields.get(name).map(String::as_str))
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    pub fn required_file(&self, name: &str) -> Result<&UploadedFile> {
        self.file(name)
            .ok_or_else(|| AppError::validation(name, "file is required"))
    }

    #[cfg(test)]
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

fn required(field: &str, value: Option<&str>) -> Result<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::validation(field, "is required"))
}

fn amount(field: &str, value: Option<&str>) -> Result<String> {
    let raw = required(field, value)?;
    match raw.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(raw),
        _ => Err(AppError::validation(field, "must be a non-negative amount")),
    }
}

// ─────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub age: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub currency: Option<String>,
}

pub struct Registration {
    pub name: String,
    pub first_name: String,
    pub age: u16,
    pub email: String,
    pub password: Zeroizing<String>,
    pub currency: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("first_name", &self.first_name)
            .field("age", &self.age)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("currency", &self.currency)
            .finish()
    }
}

impl RegisterForm {
    pub fn validate(self) -> Result<Registration> {
        let name = required("name", self.name.as_deref())?;
        let first_name = required("first_name", self.first_name.as_deref())?;

        let age = required("age", self.age.as_deref())?
            .parse::<u16>()
            .ok()
            .filter(|age| (1..=150).contains(age))
            .ok_or_else(|| AppError::validation("age", "must be a whole number between 1 and 150"))?;

        let email = required("email", self.email.as_deref())?;
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
            && !email.contains(char::is_whitespace);
        if !well_formed {
            return Err(AppError::validation("email", "must be a valid email address"));
        }

        let password = Zeroizing::new(self.password.unwrap_or_default());
        if password.is_empty() {
            return Err(AppError::validation("password", "is required"));
        }

        let currency = required("currency", self.currency.as_deref())?;

        Ok(Registration {
            name,
            first_name,
            age,
            email,
            password,
            currency,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Payment steps
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PaymentMethodForm {
    pub payment_method: Option<String>,
}

impl PaymentMethodForm {
    pub fn validate(self) -> Result<PaymentMethod> {
        match self.payment_method.as_deref().map(str::trim) {
            Some("card") => Ok(PaymentMethod::Card),
            Some("ticket") => Ok(PaymentMethod::Ticket),
            _ => Err(AppError::validation(
                "payment_method",
                "must be `card` or `ticket`",
            )),
        }
    }
}

/// Card text fields. Photo references are filled in after the files are stored.
pub fn card_details(form: &SubmittedForm) -> Result<CardDetails> {
    Ok(CardDetails {
        card_type: form.required("card_type")?,
        number: form.required("card_number")?,
        code: form.required("card_code")?,
        date: form.required("card_date")?,
        amount: form.amount("card_amount")?,
        recto_photo: None,
        verso_photo: None,
    })
}

pub fn ticket_details(form: &SubmittedForm) -> Result<TicketDetails> {
    Ok(TicketDetails {
        code: form.required("ticket_code")?,
        amount: form.amount("ticket_amount")?,
        ticket_type: form.required("ticket_type")?,
        expiration: form.required("ticket_expiration")?,
        ticket_photo: None,
    })
}

pub fn final_validation_details(form: &SubmittedForm) -> Result<FinalValidationDetails> {
    Ok(FinalValidationDetails {
        hotel_name: form.required("hotel_name")?,
        room_number: form.required("room_number")?,
        expected_date: form.required("expected_date")?,
        final_photo: None,
    })
}

// ─────────────────────────────────────────────────────────
// Admin forms
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AdminLoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionForm {
    pub action: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Validate,
    Reject,
}

impl DecisionForm {
    pub fn validate(self) -> Result<Decision> {
        match self.action.as_deref().map(str::trim) {
            Some("validate") => Ok(Decision::Validate),
            Some("reject") => Ok(Decision::Reject),
            _ => Err(AppError::validation("action", "must be `validate` or `reject`")),
        }
    }
}
