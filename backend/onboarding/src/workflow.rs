//! The onboarding state machine.
//!
//! ```text
//! registered → payment_method_chosen → card_details_submitted   ┐
//!                                    → ticket_details_submitted ┴→ complementary_payment_submitted
//!   → receipt_generated → receipt_submitted → crypto_payment_submitted → final_validation_submitted
//! ```
//!
//! A step is accepted when the record sits at the step's predecessor, or at
//! the step's own marker (a re-submission that replaces the step's fields).
//! Every other call is [`AppError::OutOfOrder`]. Steps only write their own
//! fields, so earlier data survives later steps.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{FinalValidationDetails, PaymentDetails, PaymentMethod, UserRecord, WorkflowStatus};

pub const RECEIPT_CODE_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ChoosePaymentMethod,
    CardDetails,
    TicketDetails,
    ComplementaryPayment,
    GenerateReceipt,
    SubmitReceipt,
    CryptoPayment,
    FinalValidation,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Self::ChoosePaymentMethod => "submit_payment_method",
            Self::CardDetails => "upload_card_details",
            Self::TicketDetails => "upload_ticket_details",
            Self::ComplementaryPayment => "submit_complementary_payment",
            Self::GenerateReceipt => "receipt",
            Self::SubmitReceipt => "submit_receipt",
            Self::CryptoPayment => "submit_crypto_payment",
            Self::FinalValidation => "submit_final_validation",
        }
    }

    /// Status the record holds once the step completed.
    pub fn marker(self) -> WorkflowStatus {
        match self {
            Self::ChoosePaymentMethod => WorkflowStatus::PaymentMethodChosen,
            Self::CardDetails => WorkflowStatus::CardDetailsSubmitted,
            Self::TicketDetails => WorkflowStatus::TicketDetailsSubmitted,
            Self::ComplementaryPayment => WorkflowStatus::ComplementaryPaymentSubmitted,
            Self::GenerateReceipt => WorkflowStatus::ReceiptGenerated,
            Self::SubmitReceipt => WorkflowStatus::ReceiptSubmitted,
            Self::CryptoPayment => WorkflowStatus::CryptoPaymentSubmitted,
            Self::FinalValidation => WorkflowStatus::FinalValidationSubmitted,
        }
    }

    /// Ordering and payment-branch checks for `record`.
    pub fn check(self, record: &UserRecord) -> Result<()> {
        let status = record.status;
        let marker = self.marker();
        let in_order = match self {
            // The receipt stays viewable for the rest of the flow.
            Self::GenerateReceipt => {
                status.rank() >= WorkflowStatus::ComplementaryPaymentSubmitted.rank()
            }
            _ => status == marker || status.rank() + 1 == marker.rank(),
        };
        if !in_order {
            return Err(AppError::OutOfOrder {
                step: self.name(),
                status,
            });
        }

        let required_method = match self {
            Self::CardDetails => Some(PaymentMethod::Card),
            Self::TicketDetails => Some(PaymentMethod::Ticket),
            _ => None,
        };
        if let Some(required) = required_method {
            if record.payment_method != Some(required) {
                return Err(AppError::Conflict(format!(
                    "{} requires the {} payment method",
                    self.name(),
                    required.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Input of one workflow step, already validated.
#[derive(Debug, Clone)]
pub enum Submission {
    PaymentMethod(PaymentMethod),
    InitialPayment(PaymentDetails),
    ComplementaryPayment(PaymentDetails),
    Receipt,
    CryptoProof(String),
    FinalValidation(FinalValidationDetails),
}

impl Submission {
    pub fn step(&self) -> Step {
        match self {
            Self::PaymentMethod(_) => Step::ChoosePaymentMethod,
            Self::InitialPayment(PaymentDetails::Card(_)) => Step::CardDetails,
            Self::InitialPayment(PaymentDetails::Ticket(_)) => Step::TicketDetails,
            Self::ComplementaryPayment(_) => Step::ComplementaryPayment,
            Self::Receipt => Step::SubmitReceipt,
            Self::CryptoProof(_) => Step::CryptoPayment,
            Self::FinalValidation(_) => Step::FinalValidation,
        }
    }

    /// Stored artifact names the submission refers to.
    pub fn artifacts(&self) -> Vec<&str> {
        match self {
            Self::InitialPayment(details) | Self::ComplementaryPayment(details) => details
                .artifacts()
                .into_iter()
                .map(|(_, name)| name)
                .collect(),
            Self::CryptoProof(name) => vec![name.as_str()],
            Self::FinalValidation(details) => details.final_photo.as_deref().into_iter().collect(),
            Self::PaymentMethod(_) | Self::Receipt => Vec::new(),
        }
    }

    /// Subject and body of the message sent to the administrator.
    pub fn admin_notice(&self, record: &UserRecord) -> (&'static str, String) {
        let email = &record.email;
        let currency = &record.currency;
        match self {
            Self::PaymentMethod(method) => (
                "Payment method selected",
                format!("User {email} selected the {} payment method.", method.as_str()),
            ),
            Self::InitialPayment(PaymentDetails::Card(card)) => (
                "New card details submitted",
                format!(
                    "User {email} submitted card details ({}, {} {currency}).",
                    card.card_type, card.amount
                ),
            ),
            Self::InitialPayment(PaymentDetails::Ticket(ticket)) => (
                "New ticket details submitted",
                format!(
                    "User {email} submitted ticket details ({}, {} {currency}).",
                    ticket.ticket_type, ticket.amount
                ),
            ),
            Self::ComplementaryPayment(details) => (
                "Complementary payment submitted",
                format!(
                    "User {email} submitted complementary payment details ({} {currency}).",
                    details.amount()
                ),
            ),
            Self::Receipt => (
                "Receipt submitted",
                format!(
                    "User {email} submitted their receipt (code: {}).",
                    record.receipt_code.as_deref().unwrap_or("N/A")
                ),
            ),
            Self::CryptoProof(_) => (
                "Crypto payment proof submitted",
                format!("User {email} submitted a crypto payment proof."),
            ),
            Self::FinalValidation(details) => (
                "Final validation submitted",
                format!(
                    "User {email} submitted final validation details (hotel: {}, room: {}).",
                    details.hotel_name, details.room_number
                ),
            ),
        }
    }
}

/// Check ordering, merge the submission into `record` and advance its status.
pub fn apply(record: &mut UserRecord, submission: Submission, now: DateTime<Utc>) -> Result<()> {
    let step = submission.step();
    step.check(record)?;

    match submission {
        Submission::PaymentMethod(method) => record.payment_method = Some(method),
        Submission::InitialPayment(details) => record.payment_details = Some(details),
        Submission::ComplementaryPayment(details) => {
            if record.payment_method != Some(details.method()) {
                return Err(AppError::Conflict(format!(
                    "complementary payment must use the {} payment method",
                    record.payment_method.map_or("chosen", PaymentMethod::as_str)
                )));
            }
            record.complementary_payment_details = Some(details);
            record.complementary_payment_confirmed = true;
        }
        Submission::Receipt => {}
        Submission::CryptoProof(filename) => record.crypto_payment_proof = Some(filename),
        Submission::FinalValidation(details) => record.final_validation_details = Some(details),
    }

    advance(record, step.marker(), now);
    Ok(())
}

/// Return the record's receipt code, generating it on first view.
///
/// The status moves to `receipt_generated` only from
/// `complementary_payment_submitted`; later views never move it back.
pub fn issue_receipt(record: &mut UserRecord, now: DateTime<Utc>) -> Result<String> {
    Step::GenerateReceipt.check(record)?;

    if let Some(code) = &record.receipt_code {
        return Ok(code.clone());
    }

    let code = new_receipt_code();
    record.receipt_code = Some(code.clone());
    record.receipt_generated_at = Some(now);
    advance(record, WorkflowStatus::ReceiptGenerated, now);
    Ok(code)
}

fn advance(record: &mut UserRecord, to: WorkflowStatus, now: DateTime<Utc>) {
    if to.rank() >= record.status.rank() {
        record.status = to;
    }
    record.updated_at = now;
}

/// 16 uppercase hexadecimal characters.
pub fn new_receipt_code() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..RECEIPT_CODE_LEN].to_ascii_uppercase()
}
