use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::Result;
use crate::status::{compute_status, outstanding_balance};
use crate::types::{FeeRecord, PaymentStatus, RecordId};

use super::Distributor;

/// new state of a fee after a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeUpdate {
    pub fee_id: RecordId,
    /// part of the payment applied to the fee
    pub applied: Money,
    pub paid: Money,
    pub balance: Money,
    pub status: PaymentStatus,
    pub unallocated: Money,
}

impl FeeUpdate {
    pub fn changed(&self) -> bool {
        self.applied.is_positive()
    }

    /// copy the new paid amount onto the fee
    pub fn write_to(&self, fee: &mut FeeRecord) {
        if fee.id == self.fee_id {
            fee.paid = self.paid;
        }
    }
}

impl Distributor {
    /// apply a payment to a single fee, discount included
    pub fn apply_to_fee(&self, fee: &FeeRecord, amount: Money) -> Result<FeeUpdate> {
        self.validate_amount(amount)?;

        let financed = fee.financed_amount();
        let outstanding = outstanding_balance(financed, fee.paid);
        self.check_overpayment(amount.saturating_sub(outstanding))?;

        let applied = amount.min(outstanding);
        let paid = fee.paid + applied;

        Ok(FeeUpdate {
            fee_id: fee.id,
            applied,
            paid,
            balance: outstanding_balance(financed, paid),
            status: compute_status(paid, financed)?,
            unallocated: amount - applied,
        })
    }
}

/// apply a payment to a fee with the default options
pub fn apply_fee_payment(fee: &FeeRecord, amount: Money) -> Result<FeeUpdate> {
    Distributor::default().apply_to_fee(fee, amount)
}
