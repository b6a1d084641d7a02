use chrono::Datelike;
use hourglass_rs::SafeTimeProvider;

use crate::errors::{FeeError, Result};
use crate::events::{Event, EventStore};
use crate::store::CounterStore;
use crate::types::{DocumentType, RecordRef, SchoolId};

use super::number::ReceiptNumber;

/// issues receipt numbers from a school's counters
///
/// Every reservation is one call to [`CounterStore::reserve_next`]; numbers
/// are never guessed from existing rows. A reserved number that ends up unused
/// leaves a gap in the sequence, which is accepted.
pub struct ReceiptNumberReserver<S: CounterStore> {
    store: S,
}

impl<S: CounterStore> ReceiptNumberReserver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// reserve the next number of a school's sequence
    pub fn reserve_receipt_number(
        &self,
        school_id: SchoolId,
        document_type: DocumentType,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReceiptNumber> {
        if let Some(reason) = self.store.capabilities().missing() {
            log::error!("cannot reserve {} for school {}: {}", document_type, school_id, reason);
            return Err(FeeError::reservation_failed(school_id, document_type, reason));
        }

        let now = time_provider.now();
        let reservation = self.store.reserve_next(school_id, document_type, now.year())?;
        let number = ReceiptNumber::compose(&reservation.config, reservation.year, reservation.sequence);

        if let (true, Some(previous_year)) = (reservation.reset, reservation.previous_year) {
            log::info!(
                "{} counter of school {} restarted for {} (was {})",
                document_type,
                school_id,
                reservation.year,
                previous_year
            );
            events.emit(Event::CounterReset {
                school_id,
                document_type,
                previous_year,
                new_year: reservation.year,
                timestamp: now,
            });
        }

        log::debug!("reserved {} for school {} ({})", number, school_id, document_type);
        events.emit(Event::ReceiptNumberReserved {
            school_id,
            document_type,
            receipt_number: number.to_string(),
            sequence: reservation.sequence,
            year: reservation.year,
            timestamp: now,
        });

        Ok(number)
    }

    /// return `existing` untouched, or reserve a new number when there is none
    ///
    /// Viewing a record that already has a number never touches the counter.
    pub fn get_or_reserve(
        &self,
        existing: Option<&str>,
        school_id: SchoolId,
        document_type: DocumentType,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReceiptNumber> {
        match existing.map(str::trim).filter(|s| !s.is_empty()) {
            Some(existing) => Ok(self.read_existing(existing, school_id, document_type)),
            None => self.reserve_receipt_number(school_id, document_type, time_provider, events),
        }
    }

    /// receipt number of a stored fee or installment, assigning one on first use
    ///
    /// When two callers race on the same record only one assignment sticks;
    /// the other caller gets the winning number back and its own reservation
    /// becomes a gap.
    pub fn get_or_reserve_for_record(
        &self,
        record: RecordRef,
        school_id: SchoolId,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReceiptNumber> {
        let document_type = record.record_type.document_type();
        if let Some(reason) = self.store.capabilities().missing() {
            log::error!("cannot number {} for school {}: {}", record, school_id, reason);
            return Err(FeeError::reservation_failed(school_id, document_type, reason));
        }

        let stored = self.store.receipt_number(record)?;
        if let Some(existing) = stored.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return Ok(self.read_existing(existing, school_id, document_type));
        }

        let number = self.reserve_receipt_number(school_id, document_type, time_provider, events)?;
        match self.claim(record, &number) {
            Ok(()) => {
                log::debug!("assigned {} to {}", number, record);
                events.emit(Event::ReceiptNumberAssigned {
                    record,
                    receipt_number: number.to_string(),
                    timestamp: time_provider.now(),
                });
                Ok(number)
            }
            Err(FeeError::ConcurrentAssignmentLost { existing, .. }) => {
                log::warn!("{} was numbered {} concurrently, {} left unused", record, existing, number);
                events.emit(Event::AssignmentRaceLost {
                    record,
                    wasted_number: number.to_string(),
                    winning_number: existing.clone(),
                    timestamp: time_provider.now(),
                });
                Ok(self.read_existing(&existing, school_id, document_type))
            }
            Err(e) => Err(e),
        }
    }

    /// persist `number` on the record unless another writer got there first
    fn claim(&self, record: RecordRef, number: &ReceiptNumber) -> Result<()> {
        if self.store.conditional_set_receipt_number(record, number.as_str())? {
            return Ok(());
        }

        let existing = self.store.receipt_number(record)?.unwrap_or_default();
        Err(FeeError::ConcurrentAssignmentLost {
            record_id: record.id,
            existing,
        })
    }

    /// parse against the school's format; unknown schools keep the string as is
    fn read_existing(&self, existing: &str, school_id: SchoolId, document_type: DocumentType) -> ReceiptNumber {
        self.store
            .school_counters(school_id)
            .ok()
            .and_then(|counters| ReceiptNumber::parse(existing, &counters.sequence(document_type).config).ok())
            .unwrap_or_else(|| ReceiptNumber::verbatim(existing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchoolNumbering, SequenceConfig};
    use crate::store::{InMemoryCounterStore, Reservation, SchoolCounters, SqliteCounterStore, StoreCapabilities};
    use chrono::{Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use uuid::Uuid;

    fn time_in(year: i32) -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(year, 3, 1, 9, 0, 0).unwrap()
        ))
    }

    fn reserver_with_school(numbering: &SchoolNumbering) -> (ReceiptNumberReserver<InMemoryCounterStore>, SchoolId) {
        let store = InMemoryCounterStore::new();
        let school_id = Uuid::new_v4();
        store.register_school(school_id, numbering).unwrap();
        (ReceiptNumberReserver::new(store), school_id)
    }

    /// store that lets a rival writer number the record right before our claim
    struct RacingStore {
        inner: InMemoryCounterStore,
        rival_number: String,
        raced: AtomicBool,
        hide_settings: bool,
    }

    impl CounterStore for RacingStore {
        fn capabilities(&self) -> StoreCapabilities {
            self.inner.capabilities()
        }

        fn register_school(&self, school_id: SchoolId, numbering: &SchoolNumbering) -> Result<()> {
            self.inner.register_school(school_id, numbering)
        }

        fn import_counter(
            &self,
            school_id: SchoolId,
            document_type: DocumentType,
            counter: u64,
            year: Option<i32>,
        ) -> Result<()> {
            self.inner.import_counter(school_id, document_type, counter, year)
        }

        fn school_counters(&self, school_id: SchoolId) -> Result<SchoolCounters> {
            if self.hide_settings {
                return Err(FeeError::SchoolNotFound { school_id });
            }
            self.inner.school_counters(school_id)
        }

        fn reserve_next(
            &self,
            school_id: SchoolId,
            document_type: DocumentType,
            current_year: i32,
        ) -> Result<Reservation> {
            self.inner.reserve_next(school_id, document_type, current_year)
        }

        fn register_record(&self, record: RecordRef, school_id: SchoolId) -> Result<()> {
            self.inner.register_record(record, school_id)
        }

        fn receipt_number(&self, record: RecordRef) -> Result<Option<String>> {
            self.inner.receipt_number(record)
        }

        fn conditional_set_receipt_number(&self, record: RecordRef, number: &str) -> Result<bool> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner.conditional_set_receipt_number(record, &self.rival_number)?;
            }
            self.inner.conditional_set_receipt_number(record, number)
        }
    }

    #[test]
    fn test_reserve_sequential_numbers() {
        let (reserver, school_id) = reserver_with_school(&SchoolNumbering::standard());
        let time = time_in(2025);
        let mut events = EventStore::new();

        let first = reserver
            .reserve_receipt_number(school_id, DocumentType::FeeReceipt, &time, &mut events)
            .unwrap();
        let second = reserver
            .reserve_receipt_number(school_id, DocumentType::FeeReceipt, &time, &mut events)
            .unwrap();
        let installment = reserver
            .reserve_receipt_number(school_id, DocumentType::InstallmentReceipt, &time, &mut events)
            .unwrap();

        assert_eq!(first.as_str(), "REC1");
        assert_eq!(second.as_str(), "REC2");
        assert_eq!(installment.as_str(), "INS1");

        let events = events.take_events();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| matches!(e, Event::ReceiptNumberReserved { .. })));
    }

    #[test]
    fn test_year_rollover_restarts_at_one() {
        let (reserver, school_id) = reserver_with_school(&SchoolNumbering::standard());
        reserver
            .store()
            .import_counter(school_id, DocumentType::FeeReceipt, 227, Some(2024))
            .unwrap();
        let mut events = EventStore::new();

        let number = reserver
            .reserve_receipt_number(school_id, DocumentType::FeeReceipt, &time_in(2025), &mut events)
            .unwrap();
        assert_eq!(number.as_str(), "REC1");

        let counters = reserver.store().school_counters(school_id).unwrap();
        assert_eq!(counters.fee.counter, 1);
        assert_eq!(counters.fee.year, Some(2025));

        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::CounterReset { previous_year: 2024, new_year: 2025, .. }
        )));
    }

    #[test]
    fn test_year_prefixed_rollover_with_advancing_clock() {
        let numbering = SchoolNumbering {
            fee_receipts: SequenceConfig::year_prefixed("REC", 4),
            installment_receipts: SequenceConfig::auto("INS"),
        };
        let (reserver, school_id) = reserver_with_school(&numbering);
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap()
        ));
        let control = time.test_control().unwrap();
        let mut events = EventStore::new();

        let december = reserver
            .reserve_receipt_number(school_id, DocumentType::FeeReceipt, &time, &mut events)
            .unwrap();
        control.advance(Duration::days(1));
        let january = reserver
            .reserve_receipt_number(school_id, DocumentType::FeeReceipt, &time, &mut events)
            .unwrap();

        assert_eq!(december.as_str(), "REC2024-0001");
        assert_eq!(january.as_str(), "REC2025-0001");
    }

    #[test]
    fn test_get_or_reserve_does_not_touch_counter_for_existing() {
        let (reserver, school_id) = reserver_with_school(&SchoolNumbering::standard());
        let time = time_in(2025);
        let mut events = EventStore::new();

        let number = reserver
            .get_or_reserve(Some("REC228"), school_id, DocumentType::FeeReceipt, &time, &mut events)
            .unwrap();

        assert_eq!(number.as_str(), "REC228");
        assert_eq!(number.sequence(), Some(228));
        assert_eq!(reserver.store().school_counters(school_id).unwrap().fee.counter, 0);
        assert!(events.is_empty());

        // blank counts as absent
        let fresh = reserver
            .get_or_reserve(Some("  "), school_id, DocumentType::FeeReceipt, &time, &mut events)
            .unwrap();
        assert_eq!(fresh.as_str(), "REC1");
    }

    #[test]
    fn test_get_or_reserve_for_record_is_stable() {
        let (reserver, school_id) = reserver_with_school(&SchoolNumbering::standard());
        let time = time_in(2025);
        let mut events = EventStore::new();
        let record = RecordRef::fee(Uuid::new_v4());
        reserver.store().register_record(record, school_id).unwrap();

        let first = reserver.get_or_reserve_for_record(record, school_id, &time, &mut events).unwrap();
        let again = reserver.get_or_reserve_for_record(record, school_id, &time, &mut events).unwrap();

        assert_eq!(first.as_str(), "REC1");
        assert_eq!(again.as_str(), "REC1");
        assert_eq!(reserver.store().school_counters(school_id).unwrap().fee.counter, 1);
        assert_eq!(reserver.store().receipt_number(record).unwrap().as_deref(), Some("REC1"));
        assert!(events.events().iter().any(|e| matches!(e, Event::ReceiptNumberAssigned { .. })));
    }

    #[test]
    fn test_lost_assignment_returns_winner() {
        let inner = InMemoryCounterStore::new();
        let school_id = Uuid::new_v4();
        inner.register_school(school_id, &SchoolNumbering::standard()).unwrap();
        let record = RecordRef::installment(Uuid::new_v4());
        inner.register_record(record, school_id).unwrap();

        let reserver = ReceiptNumberReserver::new(RacingStore {
            inner,
            rival_number: "INS77".to_string(),
            raced: AtomicBool::new(false),
            hide_settings: false,
        });
        let mut events = EventStore::new();

        let number = reserver
            .get_or_reserve_for_record(record, school_id, &time_in(2025), &mut events)
            .unwrap();

        assert_eq!(number.as_str(), "INS77");
        assert_eq!(reserver.store().receipt_number(record).unwrap().as_deref(), Some("INS77"));
        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::AssignmentRaceLost { wasted_number, winning_number, .. }
                if wasted_number == "INS1" && winning_number == "INS77"
        )));
    }

    #[test]
    fn test_concurrent_record_views_agree() {
        let (reserver, school_id) = reserver_with_school(&SchoolNumbering::standard());
        let reserver = Arc::new(reserver);
        let record = RecordRef::fee(Uuid::new_v4());
        reserver.store().register_record(record, school_id).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reserver = Arc::clone(&reserver);
                thread::spawn(move || {
                    let mut events = EventStore::new();
                    reserver
                        .get_or_reserve_for_record(record, school_id, &time_in(2025), &mut events)
                        .unwrap()
                        .into_string()
                })
            })
            .collect();

        let numbers: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(numbers.len(), 1);
        let stored = reserver.store().receipt_number(record).unwrap();
        assert!(numbers.contains(stored.as_deref().unwrap()));
    }

    #[test]
    fn test_concurrent_reservations_are_unique() {
        let (reserver, school_id) = reserver_with_school(&SchoolNumbering::standard());
        let reserver = Arc::new(reserver);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let reserver = Arc::clone(&reserver);
                thread::spawn(move || {
                    let time = time_in(2025);
                    let mut events = EventStore::new();
                    (0..40)
                        .map(|_| {
                            reserver
                                .reserve_receipt_number(school_id, DocumentType::InstallmentReceipt, &time, &mut events)
                                .unwrap()
                                .into_string()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for number in handle.join().unwrap() {
                assert!(seen.insert(number.clone()), "duplicate receipt number {}", number);
            }
        }
        assert_eq!(seen.len(), 240);
    }

    #[test]
    fn test_store_without_receipt_column_fails_fast() {
        let store = InMemoryCounterStore::with_capabilities(StoreCapabilities {
            atomic_increment: true,
            receipt_number_column: false,
        });
        let school_id = Uuid::new_v4();
        store.register_school(school_id, &SchoolNumbering::standard()).unwrap();
        let reserver = ReceiptNumberReserver::new(store);
        let mut events = EventStore::new();

        let err = reserver
            .reserve_receipt_number(school_id, DocumentType::FeeReceipt, &time_in(2025), &mut events)
            .unwrap_err();

        assert!(matches!(err, FeeError::ReservationFailed { .. }));
        assert_eq!(reserver.store().school_counters(school_id).unwrap().fee.counter, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_unknown_school_fails() {
        let reserver = ReceiptNumberReserver::new(InMemoryCounterStore::new());
        let mut events = EventStore::new();
        let result = reserver.reserve_receipt_number(
            Uuid::new_v4(),
            DocumentType::FeeReceipt,
            &time_in(2025),
            &mut events,
        );
        assert!(matches!(result, Err(FeeError::ReservationFailed { .. })));
    }

    #[test]
    fn test_legacy_sqlite_schema_fails_as_reservation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE fees (id TEXT PRIMARY KEY, school_id TEXT NOT NULL, payment_note TEXT);")
            .unwrap();
        let store = SqliteCounterStore::from_connection(conn).unwrap();
        let school_id = Uuid::new_v4();
        store.register_school(school_id, &SchoolNumbering::standard()).unwrap();
        let record = RecordRef::fee(Uuid::new_v4());
        store.register_record(record, school_id).unwrap();

        let reserver = ReceiptNumberReserver::new(store);
        let mut events = EventStore::new();
        let err = reserver
            .get_or_reserve_for_record(record, school_id, &time_in(2025), &mut events)
            .unwrap_err();

        assert!(matches!(err, FeeError::ReservationFailed { .. }));
        assert_eq!(reserver.store().school_counters(school_id).unwrap().fee.counter, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_minted_number_equals_later_views() {
        let (reserver, school_id) = reserver_with_school(&SchoolNumbering::standard());
        let record = RecordRef::fee(Uuid::new_v4());
        reserver.store().register_record(record, school_id).unwrap();
        let time = time_in(2025);
        let mut events = EventStore::new();

        let minted = reserver.get_or_reserve_for_record(record, school_id, &time, &mut events).unwrap();
        let viewed = reserver.get_or_reserve_for_record(record, school_id, &time, &mut events).unwrap();

        assert_eq!(minted, viewed);
    }

    #[test]
    fn test_lost_race_survives_unreadable_settings() {
        let inner = InMemoryCounterStore::new();
        let school_id = Uuid::new_v4();
        inner.register_school(school_id, &SchoolNumbering::standard()).unwrap();
        let record = RecordRef::fee(Uuid::new_v4());
        inner.register_record(record, school_id).unwrap();

        let reserver = ReceiptNumberReserver::new(RacingStore {
            inner,
            rival_number: "REC9".to_string(),
            raced: AtomicBool::new(false),
            hide_settings: true,
        });
        let mut events = EventStore::new();

        let number = reserver
            .get_or_reserve_for_record(record, school_id, &time_in(2025), &mut events)
            .unwrap();
        assert_eq!(number, ReceiptNumber::verbatim("REC9"));
    }
}
