pub mod number;
pub mod reserver;

pub use number::{adopt_legacy_note, legacy_note_number, ReceiptNumber};
pub use reserver::ReceiptNumberReserver;
