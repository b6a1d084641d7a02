use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{DocumentType, PaymentStatus, RecordId, RecordRef, SchoolId};

/// all events that can be emitted while numbering receipts and applying payments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // numbering events
    ReceiptNumberReserved {
        school_id: SchoolId,
        document_type: DocumentType,
        receipt_number: String,
        sequence: u64,
        year: i32,
        timestamp: DateTime<Utc>,
    },
    CounterReset {
        school_id: SchoolId,
        document_type: DocumentType,
        previous_year: i32,
        new_year: i32,
        timestamp: DateTime<Utc>,
    },
    ReceiptNumberAssigned {
        record: RecordRef,
        receipt_number: String,
        timestamp: DateTime<Utc>,
    },
    AssignmentRaceLost {
        record: RecordRef,
        wasted_number: String,
        winning_number: String,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentDistributed {
        school_id: SchoolId,
        amount: Money,
        allocated: Money,
        installments_paid: usize,
        status: PaymentStatus,
        timestamp: DateTime<Utc>,
    },
    FeePaymentApplied {
        fee_id: RecordId,
        amount: Money,
        applied: Money,
        status: PaymentStatus,
        timestamp: DateTime<Utc>,
    },
    OverpaymentDropped {
        school_id: SchoolId,
        excess: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
