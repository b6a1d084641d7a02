//! Payment entry: distribute the money, then number the receipts.

use hourglass_rs::SafeTimeProvider;

use crate::decimal::Money;
use crate::distribution::{DistributionOptions, DistributionResult, Distributor, FeeUpdate, InstallmentBalance};
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::receipts::{ReceiptNumber, ReceiptNumberReserver};
use crate::store::CounterStore;
use crate::types::{DocumentType, FeeRecord, InstallmentRecord, RecordId, RecordRef, SchoolId};

/// result of an installment payment
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentPaymentOutcome {
    pub distribution: DistributionResult,
    /// receipt numbers of the installments that received money
    pub receipts: Vec<(RecordId, ReceiptNumber)>,
}

impl InstallmentPaymentOutcome {
    pub fn receipt(&self, id: RecordId) -> Option<&ReceiptNumber> {
        self.receipts.iter().find(|(rid, _)| *rid == id).map(|(_, n)| n)
    }
}

/// result of a payment against a single fee
#[derive(Debug, Clone, PartialEq)]
pub struct FeePaymentOutcome {
    pub update: FeeUpdate,
    pub receipt: Option<ReceiptNumber>,
}

/// front desk for recording payments
///
/// Paid amounts are returned, not written; the caller persists them.
pub struct PaymentDesk<S: CounterStore> {
    reserver: ReceiptNumberReserver<S>,
    distributor: Distributor,
}

impl<S: CounterStore> PaymentDesk<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, DistributionOptions::default())
    }

    pub fn with_options(store: S, options: DistributionOptions) -> Self {
        Self {
            reserver: ReceiptNumberReserver::new(store),
            distributor: Distributor::new(options),
        }
    }

    pub fn reserver(&self) -> &ReceiptNumberReserver<S> {
        &self.reserver
    }

    pub fn store(&self) -> &S {
        self.reserver.store()
    }

    /// spread a payment over a fee's installments and number the receipts
    ///
    /// Receipts are numbered one installment at a time. If a later one fails,
    /// numbers already assigned to earlier installments stay on their records
    /// (with their events in `events`) and a retry of the same payment reuses
    /// them. `PaymentDistributed` is only emitted once every receipt is in hand.
    pub fn record_installment_payment(
        &self,
        school_id: SchoolId,
        amount: Money,
        installments: &[InstallmentRecord],
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<InstallmentPaymentOutcome> {
        let balances: Vec<InstallmentBalance> = installments.iter().map(InstallmentBalance::from).collect();
        let distribution = self.distributor.distribute(amount, &balances)?;

        let mut receipts = Vec::new();
        for (allocation, record) in distribution.allocations.iter().zip(installments) {
            if !allocation.allocated.is_positive() {
                continue;
            }
            let number = self.receipt_for(
                record.record_ref(),
                record.receipt_number.as_deref(),
                school_id,
                time_provider,
                events,
            )?;
            receipts.push((record.id, number));
        }

        log::info!(
            "payment of {} for school {} allocated {} over {} installments",
            amount,
            school_id,
            distribution.allocated,
            receipts.len()
        );
        events.emit(Event::PaymentDistributed {
            school_id,
            amount,
            allocated: distribution.allocated,
            installments_paid: distribution.paid_count(),
            status: distribution.status,
            timestamp: time_provider.now(),
        });
        self.report_excess(school_id, distribution.unallocated, time_provider, events);

        Ok(InstallmentPaymentOutcome { distribution, receipts })
    }

    /// apply a payment to one fee and number its receipt
    pub fn record_fee_payment(
        &self,
        fee: &FeeRecord,
        amount: Money,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<FeePaymentOutcome> {
        let update = self.distributor.apply_to_fee(fee, amount)?;

        let receipt = if update.changed() {
            Some(self.receipt_for(
                fee.record_ref(),
                fee.receipt_number.as_deref(),
                fee.school_id,
                time_provider,
                events,
            )?)
        } else {
            None
        };

        log::info!("payment of {} applied {} to fee {}", amount, update.applied, fee.id);
        events.emit(Event::FeePaymentApplied {
            fee_id: fee.id,
            amount,
            applied: update.applied,
            status: update.status,
            timestamp: time_provider.now(),
        });
        self.report_excess(fee.school_id, update.unallocated, time_provider, events);

        Ok(FeePaymentOutcome { update, receipt })
    }

    /// number already on the record, else one assigned through the store
    fn receipt_for(
        &self,
        record: RecordRef,
        existing: Option<&str>,
        school_id: SchoolId,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReceiptNumber> {
        let document_type: DocumentType = record.record_type.document_type();
        if existing.is_some_and(|n| !n.trim().is_empty()) {
            return self
                .reserver
                .get_or_reserve(existing, school_id, document_type, time_provider, events);
        }

        self.store().register_record(record, school_id)?;
        self.reserver
            .get_or_reserve_for_record(record, school_id, time_provider, events)
    }

    fn report_excess(
        &self,
        school_id: SchoolId,
        excess: Money,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) {
        if !excess.is_positive() {
            return;
        }
        log::warn!("over-payment of {} for school {} dropped", excess, school_id);
        events.emit(Event::OverpaymentDropped {
            school_id,
            excess,
            timestamp: time_provider.now(),
        });
    }
}
