use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::config::SchoolNumbering;
use crate::errors::{FeeError, Result};
use crate::types::{DocumentType, RecordRef, SchoolId};

use super::{CounterStore, Reservation, SchoolCounters, SequenceState, StoreCapabilities};

/// in-process counter store keyed by (school, document type)
///
/// Each reservation runs its read-reset-increment-write under one lock
/// acquisition, which makes it atomic for every thread sharing the store.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    sequences: Mutex<HashMap<(SchoolId, DocumentType), SequenceState>>,
    records: Mutex<HashMap<RecordRef, Option<String>>>,
    capabilities: StoreCapabilities,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities::full())
    }

    /// store that reports reduced capabilities, for legacy setups
    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        Self {
            sequences: Mutex::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            capabilities,
        }
    }

    fn sequences(&self) -> Result<MutexGuard<'_, HashMap<(SchoolId, DocumentType), SequenceState>>> {
        self.sequences.lock().map_err(|_| FeeError::StoreUnavailable {
            reason: "counter map lock poisoned".to_string(),
        })
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<RecordRef, Option<String>>>> {
        self.records.lock().map_err(|_| FeeError::StoreUnavailable {
            reason: "record map lock poisoned".to_string(),
        })
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn register_school(&self, school_id: SchoolId, numbering: &SchoolNumbering) -> Result<()> {
        numbering.validate()?;
        let mut sequences = self.sequences()?;
        for document_type in [DocumentType::FeeReceipt, DocumentType::InstallmentReceipt] {
            let config = numbering.sequence(document_type).clone();
            match sequences.get_mut(&(school_id, document_type)) {
                Some(state) => state.config = config,
                None => {
                    sequences.insert((school_id, document_type), SequenceState::new(config));
                }
            }
        }
        Ok(())
    }

    fn import_counter(
        &self,
        school_id: SchoolId,
        document_type: DocumentType,
        counter: u64,
        year: Option<i32>,
    ) -> Result<()> {
        let mut sequences = self.sequences()?;
        let state = sequences
            .get_mut(&(school_id, document_type))
            .ok_or(FeeError::SchoolNotFound { school_id })?;
        state.counter = counter;
        state.year = year;
        Ok(())
    }

    fn school_counters(&self, school_id: SchoolId) -> Result<SchoolCounters> {
        let sequences = self.sequences()?;
        let fee = sequences.get(&(school_id, DocumentType::FeeReceipt));
        let installment = sequences.get(&(school_id, DocumentType::InstallmentReceipt));

        match (fee, installment) {
            (Some(fee), Some(installment)) => Ok(SchoolCounters {
                school_id,
                fee: fee.clone(),
                installment: installment.clone(),
            }),
            _ => Err(FeeError::SchoolNotFound { school_id }),
        }
    }

    fn reserve_next(
        &self,
        school_id: SchoolId,
        document_type: DocumentType,
        current_year: i32,
    ) -> Result<Reservation> {
        let mut sequences = self.sequences.lock().map_err(|_| {
            FeeError::reservation_failed(school_id, document_type, "counter map lock poisoned")
        })?;

        let state = sequences.get_mut(&(school_id, document_type)).ok_or_else(|| {
            FeeError::reservation_failed(school_id, document_type, "no counter row for school")
        })?;

        Ok(state.advance(current_year))
    }

    fn register_record(&self, record: RecordRef, _school_id: SchoolId) -> Result<()> {
        self.records()?.entry(record).or_insert(None);
        Ok(())
    }

    fn receipt_number(&self, record: RecordRef) -> Result<Option<String>> {
        self.records()?
            .get(&record)
            .cloned()
            .ok_or(FeeError::RecordNotFound { record_id: record.id })
    }

    fn conditional_set_receipt_number(&self, record: RecordRef, number: &str) -> Result<bool> {
        let mut records = self.records()?;
        let slot = records
            .get_mut(&record)
            .ok_or(FeeError::RecordNotFound { record_id: record.id })?;

        if slot.as_deref().is_some_and(|existing| !existing.trim().is_empty()) {
            return Ok(false);
        }
        *slot = Some(number.to_string());
        Ok(true)
    }
}
