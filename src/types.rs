use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::Result;
use crate::status;

/// unique identifier for a school (tenant boundary)
pub type SchoolId = Uuid;

/// unique identifier for a fee or installment row
pub type RecordId = Uuid;

/// receipt document type, each with its own counter sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    FeeReceipt,
    InstallmentReceipt,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::FeeReceipt => "fee_receipt",
            DocumentType::InstallmentReceipt => "installment_receipt",
        }
    }

    /// record type whose receipts draw from this sequence
    pub fn record_type(&self) -> RecordType {
        match self {
            DocumentType::FeeReceipt => RecordType::Fee,
            DocumentType::InstallmentReceipt => RecordType::Installment,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// kind of row a receipt number is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Fee,
    Installment,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Fee => "fee",
            RecordType::Installment => "installment",
        }
    }

    /// sequence that numbers receipts of this record type
    pub fn document_type(&self) -> DocumentType {
        match self {
            RecordType::Fee => DocumentType::FeeReceipt,
            RecordType::Installment => DocumentType::InstallmentReceipt,
        }
    }
}

/// reference to a persisted fee or installment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_type: RecordType,
    pub id: RecordId,
}

impl RecordRef {
    pub fn fee(id: RecordId) -> Self {
        Self { record_type: RecordType::Fee, id }
    }

    pub fn installment(id: RecordId) -> Self {
        Self { record_type: RecordType::Installment, id }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type.as_str(), self.id)
    }
}

/// derived payment status of a fee or installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// nothing paid yet
    Unpaid,
    /// something paid, balance outstanding
    Partial,
    /// balance cleared
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// a billable charge for a student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub id: RecordId,
    pub school_id: SchoolId,
    pub amount: Money,
    pub discount: Money,
    pub paid: Money,
    pub receipt_number: Option<String>,
    pub payment_note: Option<String>,
}

impl FeeRecord {
    pub fn new(school_id: SchoolId, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            school_id,
            amount,
            discount: Money::ZERO,
            paid: Money::ZERO,
            receipt_number: None,
            payment_note: None,
        }
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_paid(mut self, paid: Money) -> Self {
        self.paid = paid;
        self
    }

    /// amount owed after discount
    pub fn financed_amount(&self) -> Money {
        status::net_amount(self.amount, self.discount)
    }

    pub fn balance(&self) -> Money {
        status::outstanding_balance(self.financed_amount(), self.paid)
    }

    pub fn status(&self) -> Result<PaymentStatus> {
        status::compute_status(self.paid, self.financed_amount())
    }

    pub fn record_ref(&self) -> RecordRef {
        RecordRef::fee(self.id)
    }
}

/// one scheduled portion of a fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentRecord {
    pub id: RecordId,
    pub fee_id: RecordId,
    pub amount: Money,
    pub paid_amount: Money,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub receipt_number: Option<String>,
    pub installment_count: u32,
    pub installment_month: Option<String>,
}

impl InstallmentRecord {
    pub fn new(fee_id: RecordId, installment_count: u32, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            fee_id,
            amount,
            paid_amount: Money::ZERO,
            due_date: None,
            paid_date: None,
            receipt_number: None,
            installment_count,
            installment_month: None,
        }
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_paid_amount(mut self, paid_amount: Money) -> Self {
        self.paid_amount = paid_amount;
        self
    }

    pub fn balance(&self) -> Money {
        status::outstanding_balance(self.amount, self.paid_amount)
    }

    pub fn status(&self) -> Result<PaymentStatus> {
        status::compute_status(self.paid_amount, self.amount)
    }

    pub fn record_ref(&self) -> RecordRef {
        RecordRef::installment(self.id)
    }
}
