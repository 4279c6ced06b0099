//! User records as persisted by the store and returned by the admin API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a record in the onboarding flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Registered,
    PaymentMethodChosen,
    CardDetailsSubmitted,
    TicketDetailsSubmitted,
    ComplementaryPaymentSubmitted,
    ReceiptGenerated,
    ReceiptSubmitted,
    CryptoPaymentSubmitted,
    FinalValidationSubmitted,
}

impl WorkflowStatus {
    /// Ordinal in the forward sequence. The card and ticket branches share a rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Registered => 0,
            Self::PaymentMethodChosen => 1,
            Self::CardDetailsSubmitted | Self::TicketDetailsSubmitted => 2,
            Self::ComplementaryPaymentSubmitted => 3,
            Self::ReceiptGenerated => 4,
            Self::ReceiptSubmitted => 5,
            Self::CryptoPaymentSubmitted => 6,
            Self::FinalValidationSubmitted => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::PaymentMethodChosen => "payment_method_chosen",
            Self::CardDetailsSubmitted => "card_details_submitted",
            Self::TicketDetailsSubmitted => "ticket_details_submitted",
            Self::ComplementaryPaymentSubmitted => "complementary_payment_submitted",
            Self::ReceiptGenerated => "receipt_generated",
            Self::ReceiptSubmitted => "receipt_submitted",
            Self::CryptoPaymentSubmitted => "crypto_payment_submitted",
            Self::FinalValidationSubmitted => "final_validation_submitted",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer verdict, independent of the user's own progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    #[default]
    Pending,
    Validated,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Ticket,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Ticket => "ticket",
        }
    }
}

/// Prepaid or gift card used for a payment round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    #[serde(rename = "type", default)]
    pub card_type: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub amount: String,
    pub recto_photo: Option<String>,
    pub verso_photo: Option<String>,
}

/// Physical ticket used for a payment round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetails {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub amount: String,
    #[serde(rename = "type", default)]
    pub ticket_type: String,
    #[serde(default)]
    pub expiration: String,
    pub ticket_photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
    Card(CardDetails),
    Ticket(TicketDetails),
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Card(_) => PaymentMethod::Card,
            Self::Ticket(_) => PaymentMethod::Ticket,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Card(card) => &card.card_type,
            Self::Ticket(ticket) => &ticket.ticket_type,
        }
    }

    pub fn amount(&self) -> &str {
        match self {
            Self::Card(card) => &card.amount,
            Self::Ticket(ticket) => &ticket.amount,
        }
    }

    /// Stored artifacts as `(field, filename)` pairs.
    pub fn artifacts(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Card(card) => [
                ("recto_photo", card.recto_photo.as_deref()),
                ("verso_photo", card.verso_photo.as_deref()),
            ]
            .into_iter()
            .filter_map(|(field, file)| file.map(|f| (field, f)))
            .collect(),
            Self::Ticket(ticket) => ticket
                .ticket_photo
                .as_deref()
                .map(|f| vec![("ticket_photo", f)])
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalValidationDetails {
    #[serde(default)]
    pub hotel_name: String,
    #[serde(default)]
    pub room_number: String,
    #[serde(default)]
    pub expected_date: String,
    pub final_photo: Option<String>,
}

/// One user's full onboarding and payment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub first_name: String,
    pub age: u16,
    pub email: String,
    pub currency: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub admin_status: AdminStatus,
    pub registration_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_details: Option<PaymentDetails>,
    #[serde(default)]
    pub complementary_payment_details: Option<PaymentDetails>,
    #[serde(default)]
    pub complementary_payment_confirmed: bool,
    #[serde(default)]
    pub receipt_code: Option<String>,
    #[serde(default)]
    pub receipt_generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub crypto_payment_proof: Option<String>,
    #[serde(default)]
    pub final_validation_details: Option<FinalValidationDetails>,
}

impl UserRecord {
    /// A freshly registered record.
    pub fn new(
        name: String,
        first_name: String,
        age: u16,
        email: String,
        currency: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            first_name,
            age,
            email,
            currency,
            status: WorkflowStatus::Registered,
            admin_status: AdminStatus::Pending,
            registration_date: now,
            updated_at: now,
            payment_method: None,
            payment_details: None,
            complementary_payment_details: None,
            complementary_payment_confirmed: false,
            receipt_code: None,
            receipt_generated_at: None,
            crypto_payment_proof: None,
            final_validation_details: None,
        }
    }
}

/// A record annotated with its identifier, as listed on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct UserEntry {
    pub id: String,
    #[serde(flatten)]
    pub record: UserRecord,
}
