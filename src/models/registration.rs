//! Registration rows as far as URL repair is concerned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registration record owned by the registration subsystem.
///
/// Only the URL columns are ever written by this service.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub id: Uuid,

    /// Correlation key used in uploaded file names.
    pub application_id: String,

    /// Public URL of the uploaded payment proof, possibly stale.
    pub payment_proof_url: Option<String>,

    /// Public URL of the issued payment receipt, possibly stale.
    pub payment_receipt_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which URL column a repair targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlField {
    PaymentProof,
    PaymentReceipt,
}

impl UrlField {
    pub fn column(self) -> &'static str {
        match self {
            UrlField::PaymentProof => "payment_proof_url",
            UrlField::PaymentReceipt => "payment_receipt_url",
        }
    }
}
