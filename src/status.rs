//! Status and balance derivation for fees and installments.
//!
//! Every paid/partial/unpaid label in the crate comes from [`compute_status`].

use crate::decimal::Money;
use crate::errors::{FeeError, Result};
use crate::types::PaymentStatus;

/// derive the tri-state status from cumulative payments and the net amount owed
///
/// Rules are applied in order: nothing paid is `Unpaid`, paid at or above the
/// net amount is `Paid`, anything else is `Partial`.
pub fn compute_status(paid_to_date: Money, net_amount: Money) -> Result<PaymentStatus> {
    if paid_to_date.is_negative() || net_amount.is_negative() {
        return Err(FeeError::StatusComputationInputError {
            paid_to_date,
            net_amount,
        });
    }

    if paid_to_date.is_zero() {
        Ok(PaymentStatus::Unpaid)
    } else if paid_to_date >= net_amount {
        Ok(PaymentStatus::Paid)
    } else {
        Ok(PaymentStatus::Partial)
    }
}

/// amount owed after discount, floored at zero
pub fn net_amount(amount: Money, discount: Money) -> Money {
    amount.saturating_sub(discount)
}

/// remaining balance, floored at zero
pub fn outstanding_balance(net_amount: Money, paid_to_date: Money) -> Money {
    net_amount.saturating_sub(paid_to_date)
}
