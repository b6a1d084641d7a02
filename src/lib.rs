pub mod config;
pub mod decimal;
pub mod desk;
pub mod distribution;
pub mod errors;
pub mod events;
pub mod receipts;
pub mod status;
pub mod store;
pub mod types;

// re-export key types
pub use config::{ReceiptFormat, ResetPolicy, SchoolNumbering, SequenceConfig};
pub use decimal::Money;
pub use desk::{FeePaymentOutcome, InstallmentPaymentOutcome, PaymentDesk};
pub use distribution::{
    apply_fee_payment, distribute_payment, installment_shortfall, DistributionOptions,
    DistributionOrder, DistributionResult, Distributor, FeeUpdate, InstallmentAllocation,
    InstallmentBalance, OverpaymentPolicy,
};
pub use errors::{FeeError, Result};
pub use events::{Event, EventStore};
pub use receipts::{ReceiptNumber, ReceiptNumberReserver};
pub use status::compute_status;
pub use store::{
    CounterStore, InMemoryCounterStore, Reservation, SchoolCounters, SequenceState,
    SqliteCounterStore, StoreCapabilities,
};
pub use types::{
    DocumentType, FeeRecord, InstallmentRecord, PaymentStatus, RecordId, RecordRef, RecordType,
    SchoolId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
