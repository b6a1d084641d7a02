pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::config::{ResetPolicy, SchoolNumbering, SequenceConfig};
use crate::errors::Result;
use crate::types::{DocumentType, RecordRef, SchoolId};

pub use memory::InMemoryCounterStore;
pub use sqlite::SqliteCounterStore;

/// what a backing store can guarantee
///
/// Reservation refuses to run against a store that cannot increment
/// atomically or has nowhere first-class to persist the receipt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCapabilities {
    pub atomic_increment: bool,
    pub receipt_number_column: bool,
}

impl StoreCapabilities {
    pub fn full() -> Self {
        Self {
            atomic_increment: true,
            receipt_number_column: true,
        }
    }

    /// reason reservation is impossible, if any
    pub fn missing(&self) -> Option<&'static str> {
        if !self.atomic_increment {
            Some("store offers no atomic counter increment")
        } else if !self.receipt_number_column {
            Some("store has no receipt number column")
        } else {
            None
        }
    }
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// persisted state of one receipt sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub config: SequenceConfig,
    /// last issued sequence value, 0 when nothing was issued yet
    pub counter: u64,
    /// year of the last issued value
    pub year: Option<i32>,
}

impl SequenceState {
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            config,
            counter: 0,
            year: None,
        }
    }

    /// advance the sequence for `current_year`
    ///
    /// Callers must hold the store's lock for the whole step. The year stamp
    /// never moves backwards; an earlier `current_year` keeps counting.
    pub fn advance(&mut self, current_year: i32) -> Reservation {
        let previous_year = self.year;
        let reset = self.config.reset_policy == ResetPolicy::Yearly
            && previous_year.is_some_and(|year| year < current_year);

        let year = previous_year.map_or(current_year, |year| year.max(current_year));

        self.counter = if reset { 1 } else { self.counter + 1 };
        self.year = Some(year);

        Reservation {
            sequence: self.counter,
            year,
            previous_year,
            reset,
            config: self.config.clone(),
        }
    }
}

/// counters of both sequences of a school
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolCounters {
    pub school_id: SchoolId,
    pub fee: SequenceState,
    pub installment: SequenceState,
}

impl SchoolCounters {
    pub fn sequence(&self, document_type: DocumentType) -> &SequenceState {
        match document_type {
            DocumentType::FeeReceipt => &self.fee,
            DocumentType::InstallmentReceipt => &self.installment,
        }
    }
}

/// outcome of one atomic counter step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// the issued sequence value (post-increment)
    pub sequence: u64,
    /// year the value belongs to
    pub year: i32,
    pub previous_year: Option<i32>,
    /// counter restarted because the year rolled over
    pub reset: bool,
    /// numbering configuration read in the same step
    pub config: SequenceConfig,
}

/// durable per-school receipt counters plus receipt number columns
///
/// `reserve_next` must be a single atomic step in the backing store; a
/// client-side read followed by a write is not an acceptable implementation.
pub trait CounterStore: Send + Sync {
    fn capabilities(&self) -> StoreCapabilities;

    /// create the counter rows of a school
    fn register_school(&self, school_id: SchoolId, numbering: &SchoolNumbering) -> Result<()>;

    /// carry over a counter from an existing ledger
    fn import_counter(
        &self,
        school_id: SchoolId,
        document_type: DocumentType,
        counter: u64,
        year: Option<i32>,
    ) -> Result<()>;

    fn school_counters(&self, school_id: SchoolId) -> Result<SchoolCounters>;

    /// atomically issue the next sequence value of a school's sequence
    fn reserve_next(
        &self,
        school_id: SchoolId,
        document_type: DocumentType,
        current_year: i32,
    ) -> Result<Reservation>;

    /// create an un-numbered fee or installment row
    fn register_record(&self, record: RecordRef, school_id: SchoolId) -> Result<()>;

    fn receipt_number(&self, record: RecordRef) -> Result<Option<String>>;

    /// set the receipt number only if the row has none (or a blank one); `true` if this call won
    fn conditional_set_receipt_number(&self, record: RecordRef, number: &str) -> Result<bool>;
}
