use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Withdrawal Lifecycle State Machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a withdrawal request. Stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum WithdrawalStatus {
    Created = 0,
    Processing = 1,
    Success = 2,
    Failed = 3,
}

impl WithdrawalStatus {
    pub fn as_code(&self) -> i16 {
        *self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(WithdrawalStatus::Created),
            1 => Some(WithdrawalStatus::Processing),
            2 => Some(WithdrawalStatus::Success),
            3 => Some(WithdrawalStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Created => "created",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Success => "success",
            WithdrawalStatus::Failed => "failed",
        }
    }

    /// Success and Failed are terminal; no operation transitions them further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Success | WithdrawalStatus::Failed)
    }

    /// Validates if a status transition is allowed.
    ///
    /// Re-entering Created happens only through ingestion upserts, which are
    /// row rewrites rather than transitions, so it is absent here. Processing
    /// may re-enter itself: a repeat creation attempt overwrites the order id.
    pub fn can_transition_to(&self, next: &WithdrawalStatus) -> bool {
        match (self, next) {
            (WithdrawalStatus::Created, WithdrawalStatus::Processing) => true,
            (WithdrawalStatus::Processing, WithdrawalStatus::Processing) => true,
            (WithdrawalStatus::Processing, WithdrawalStatus::Success) => true,
            (WithdrawalStatus::Processing, WithdrawalStatus::Failed) => true,
            _ => false,
        }
    }

    /// True when a creation attempt may be dispatched for a row in this state.
    pub fn allows_creation(&self) -> bool {
        matches!(self, WithdrawalStatus::Created | WithdrawalStatus::Processing)
    }
}

// ---------------------------------------------------------------------------
// Withdrawal Request Entity
// ---------------------------------------------------------------------------

/// A stored withdrawal request row. `withdraw_request_id` is the
/// business-assigned correlation key; `order_id` and `payment_method` stay
/// empty until a payout has been created at a gateway.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub withdraw_request_id: String,
    pub beneficiary_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub amount: f64,
    pub status: WithdrawalStatus,
    pub order_id: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert payload for the record store, keyed on `withdraw_request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalUpsert {
    pub withdraw_request_id: String,
    pub beneficiary_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub amount: f64,
    pub status: WithdrawalStatus,
    pub order_id: String,
    pub payment_method: String,
}

impl WithdrawalUpsert {
    /// A freshly ingested row: Created, with no gateway correlation yet.
    pub fn ingested(
        withdraw_request_id: String,
        beneficiary_name: String,
        account_number: String,
        ifsc_code: String,
        amount: f64,
    ) -> Self {
        Self {
            withdraw_request_id,
            beneficiary_name,
            account_number,
            ifsc_code,
            amount,
            status: WithdrawalStatus::Created,
            order_id: String::new(),
            payment_method: String::new(),
        }
    }
}

/// Projection of a Created row used by amount-bounded batch selection.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreatedRow {
    pub withdraw_request_id: String,
    pub amount: f64,
    pub payment_method: String,
}

/// Projection of a Processing row used by the status poller.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessingRow {
    pub withdraw_request_id: String,
    pub order_id: String,
    pub payment_method: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
