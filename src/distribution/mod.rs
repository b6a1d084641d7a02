//! Spreads one payment over a list of installments.
//!
//! Everything here is pure: results describe the new paid amounts and the
//! caller persists them.

pub mod fee;
pub mod ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::status::{compute_status, outstanding_balance};
use crate::types::{FeeRecord, InstallmentRecord, PaymentStatus, RecordId};

pub use fee::{apply_fee_payment, FeeUpdate};
pub use ordering::DistributionOrder;

/// what the distributor needs to know about an installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentBalance {
    pub id: RecordId,
    pub amount: Money,
    pub paid_amount: Money,
    pub due_date: Option<NaiveDate>,
}

impl InstallmentBalance {
    pub fn new(id: RecordId, amount: Money, paid_amount: Money) -> Self {
        Self {
            id,
            amount,
            paid_amount,
            due_date: None,
        }
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// amount still owed, never negative
    pub fn unpaid(&self) -> Money {
        outstanding_balance(self.amount, self.paid_amount)
    }
}

impl From<&InstallmentRecord> for InstallmentBalance {
    fn from(record: &InstallmentRecord) -> Self {
        Self {
            id: record.id,
            amount: record.amount,
            paid_amount: record.paid_amount,
            due_date: record.due_date,
        }
    }
}

/// new state of one installment after a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentAllocation {
    pub id: RecordId,
    /// part of the payment that went to this installment
    pub allocated: Money,
    pub paid_amount: Money,
    pub balance: Money,
    pub status: PaymentStatus,
}

/// outcome of distributing one payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    /// one entry per input installment, in input order
    pub allocations: Vec<InstallmentAllocation>,
    pub total_paid: Money,
    pub total_amount: Money,
    pub balance: Money,
    pub status: PaymentStatus,
    /// part of the payment that was applied
    pub allocated: Money,
    /// over-payment that found no installment to go to
    pub unallocated: Money,
}

impl DistributionResult {
    /// allocations that received money, i.e. the rows to persist
    pub fn changed(&self) -> impl Iterator<Item = &InstallmentAllocation> {
        self.allocations.iter().filter(|a| a.allocated.is_positive())
    }

    pub fn allocation(&self, id: RecordId) -> Option<&InstallmentAllocation> {
        self.allocations.iter().find(|a| a.id == id)
    }

    /// number of installments fully paid after the payment
    pub fn paid_count(&self) -> usize {
        self.allocations
            .iter()
            .filter(|a| a.status == PaymentStatus::Paid)
            .count()
    }

    /// copy new paid amounts onto stored installments
    ///
    /// Installments that received money get `paid_on` as their paid date.
    /// Returns how many records were updated.
    pub fn apply_to_records(&self, records: &mut [InstallmentRecord], paid_on: NaiveDate) -> usize {
        let mut updated = 0;
        for allocation in self.changed() {
            if let Some(record) = records.iter_mut().find(|r| r.id == allocation.id) {
                record.paid_amount = allocation.paid_amount;
                record.paid_date = Some(paid_on);
                updated += 1;
            }
        }
        updated
    }
}

/// what to do with money left after every installment is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// keep the excess out of the installments and report it as unallocated
    #[default]
    Drop,
    /// refuse the whole payment
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistributionOptions {
    pub order: DistributionOrder,
    pub overpayment: OverpaymentPolicy,
}

impl DistributionOptions {
    /// earliest due installments first
    pub fn due_date_first() -> Self {
        Self {
            order: DistributionOrder::DueDateAscending,
            overpayment: OverpaymentPolicy::Drop,
        }
    }

    /// reject payments larger than the outstanding balance
    pub fn strict() -> Self {
        Self {
            order: DistributionOrder::AsGiven,
            overpayment: OverpaymentPolicy::Reject,
        }
    }
}

/// payment distributor
#[derive(Debug, Clone, Default)]
pub struct Distributor {
    options: DistributionOptions,
}

impl Distributor {
    pub fn new(options: DistributionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> DistributionOptions {
        self.options
    }

    /// apply `payment_amount` across `installments`
    pub fn distribute(&self, payment_amount: Money, installments: &[InstallmentBalance]) -> Result<DistributionResult> {
        self.validate_amount(payment_amount)?;

        let outstanding: Money = installments.iter().map(InstallmentBalance::unpaid).sum();
        let excess = payment_amount.saturating_sub(outstanding);
        self.check_overpayment(excess)?;

        let mut remaining = payment_amount;
        let mut allocated = vec![Money::ZERO; installments.len()];

        for index in self.options.order.visit_order(installments) {
            let unpaid = installments[index].unpaid();
            if !remaining.is_positive() || !unpaid.is_positive() {
                continue;
            }

            let payment = remaining.min(unpaid);
            allocated[index] = payment;
            remaining -= payment;
        }

        let mut allocations = Vec::with_capacity(installments.len());
        for (installment, allocated) in installments.iter().zip(allocated) {
            let paid_amount = installment.paid_amount + allocated;
            allocations.push(InstallmentAllocation {
                id: installment.id,
                allocated,
                paid_amount,
                balance: outstanding_balance(installment.amount, paid_amount),
                status: compute_status(paid_amount, installment.amount)?,
            });
        }

        let total_paid: Money = allocations.iter().map(|a| a.paid_amount).sum();
        let total_amount: Money = installments.iter().map(|i| i.amount).sum();

        Ok(DistributionResult {
            allocations,
            total_paid,
            total_amount,
            balance: outstanding_balance(total_amount, total_paid),
            status: compute_status(total_paid, total_amount)?,
            allocated: payment_amount - remaining,
            unallocated: remaining,
        })
    }

    fn validate_amount(&self, amount: Money) -> Result<()> {
        if amount.is_negative() {
            return Err(FeeError::InvalidPaymentAmount { amount });
        }
        Ok(())
    }

    fn check_overpayment(&self, excess: Money) -> Result<()> {
        if excess.is_positive() && self.options.overpayment == OverpaymentPolicy::Reject {
            return Err(FeeError::Overpayment { excess });
        }
        Ok(())
    }
}

/// distribute with the default options: caller order, excess dropped
pub fn distribute_payment(payment_amount: Money, installments: &[InstallmentBalance]) -> Result<DistributionResult> {
    Distributor::default().distribute(payment_amount, installments)
}

/// financed amount of a fee minus the sum of its installments
///
/// Positive when the installments cover less than the fee, negative when they
/// cover more. Nothing enforces the two to match.
pub fn installment_shortfall(fee: &FeeRecord, installments: &[InstallmentRecord]) -> Money {
    let scheduled: Money = installments
        .iter()
        .filter(|i| i.fee_id == fee.id)
        .map(|i| i.amount)
        .sum();
    fee.financed_amount() - scheduled
}
