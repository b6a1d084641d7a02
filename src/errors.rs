use thiserror::Error;

use crate::decimal::Money;
use crate::types::{DocumentType, RecordId, SchoolId};

#[derive(Error, Debug)]
pub enum FeeError {
    #[error("receipt number reservation failed for school {school_id} ({document_type}): {reason}")]
    ReservationFailed {
        school_id: SchoolId,
        document_type: DocumentType,
        reason: String,
    },

    #[error("receipt number already assigned to record {record_id}: {existing}")]
    ConcurrentAssignmentLost {
        record_id: RecordId,
        existing: String,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("invalid status input: paid to date {paid_to_date}, net amount {net_amount}")]
    StatusComputationInputError {
        paid_to_date: Money,
        net_amount: Money,
    },

    #[error("payment exceeds outstanding balance by {excess}")]
    Overpayment {
        excess: Money,
    },

    #[error("invalid receipt number: {value:?}")]
    InvalidReceiptNumber {
        value: String,
    },

    #[error("school not found: {school_id}")]
    SchoolNotFound {
        school_id: SchoolId,
    },

    #[error("record not found: {record_id}")]
    RecordNotFound {
        record_id: RecordId,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        reason: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl FeeError {
    pub fn reservation_failed(
        school_id: SchoolId,
        document_type: DocumentType,
        reason: impl Into<String>,
    ) -> Self {
        FeeError::ReservationFailed {
            school_id,
            document_type,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeeError>;
