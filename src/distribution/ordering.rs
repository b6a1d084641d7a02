use serde::{Deserialize, Serialize};

use super::InstallmentBalance;

/// order in which a payment visits installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionOrder {
    /// caller-supplied order
    #[default]
    AsGiven,
    /// earliest due date first, undated installments last, ties keep caller order
    DueDateAscending,
}

impl DistributionOrder {
    /// indices into `installments` in visiting order
    pub fn visit_order(&self, installments: &[InstallmentBalance]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..installments.len()).collect();
        if *self == DistributionOrder::DueDateAscending {
            // sort_by_key is stable
            order.sort_by_key(|&i| {
                let due = installments[i].due_date;
                (due.is_none(), due)
            });
        }
        order
    }
}
