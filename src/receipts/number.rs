use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::config::{ReceiptFormat, SequenceConfig};
use crate::errors::{FeeError, Result};
use crate::types::FeeRecord;

/// marker older installs used to park a receipt number inside the payment note
const LEGACY_NOTE_MARKER: &str = "[RN:";

/// a receipt number as issued or as found on a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptNumber {
    full: String,
    prefix: String,
    /// year written into the number, `None` unless the format carries one
    year: Option<i32>,
    /// sequence value, `None` for numbers that do not follow the configured format
    sequence: Option<u64>,
}

impl ReceiptNumber {
    /// build the string for a freshly reserved sequence value
    pub fn compose(config: &SequenceConfig, year: i32, sequence: u64) -> Self {
        let digits = match config.pad_width {
            Some(width) => format!("{:0width$}", sequence, width = width as usize),
            None => sequence.to_string(),
        };

        let (full, year) = match config.format {
            ReceiptFormat::Auto => (format!("{}{}", config.prefix, digits), None),
            ReceiptFormat::YearPrefixed => (format!("{}{}-{}", config.prefix, year, digits), Some(year)),
        };

        Self {
            full,
            prefix: config.prefix.clone(),
            year,
            sequence: Some(sequence),
        }
    }

    /// read back a persisted receipt number
    ///
    /// Strings that do not follow `config` (manual or legacy numbers) are kept
    /// verbatim without a sequence. Blank input is rejected.
    pub fn parse(raw: &str, config: &SequenceConfig) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FeeError::InvalidReceiptNumber { value: raw.to_string() });
        }

        let structured = raw.strip_prefix(config.prefix.as_str()).and_then(|rest| match config.format {
            ReceiptFormat::Auto => parse_digits::<u64>(rest).map(|sequence| (None, sequence)),
            ReceiptFormat::YearPrefixed => {
                let (year, sequence) = rest.split_once('-')?;
                if year.len() != 4 {
                    return None;
                }
                Some((Some(parse_digits::<i32>(year)?), parse_digits::<u64>(sequence)?))
            }
        });

        Ok(match structured {
            Some((year, sequence)) => Self {
                full: raw.to_string(),
                prefix: config.prefix.clone(),
                year,
                sequence: Some(sequence),
            },
            None => Self::verbatim(raw),
        })
    }

    /// keep a number exactly as written
    pub fn verbatim(raw: &str) -> Self {
        Self {
            full: raw.trim().to_string(),
            prefix: String::new(),
            year: None,
            sequence: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn into_string(self) -> String {
        self.full
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// whether the number follows the configured format
    pub fn is_structured(&self) -> bool {
        self.sequence.is_some()
    }
}

impl fmt::Display for ReceiptNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl AsRef<str> for ReceiptNumber {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// byte range of the whole marker and the number inside it
fn legacy_note_span(note: &str) -> Option<(Range<usize>, &str)> {
    let start = note.find(LEGACY_NOTE_MARKER)?;
    let inner = start + LEGACY_NOTE_MARKER.len();
    let close = note[inner..].find(']')? + inner;
    let number = note[inner..close].trim();
    (!number.is_empty()).then_some((start..close + 1, number))
}

/// receipt number embedded in a legacy payment note, e.g. `paid cash [RN:228]`
pub fn legacy_note_number(note: &str) -> Option<&str> {
    legacy_note_span(note).map(|(_, number)| number)
}

/// move a note-embedded receipt number into the fee's receipt number field
///
/// Returns `true` when the fee was changed. A fee that already carries a
/// receipt number keeps it and its note untouched.
pub fn adopt_legacy_note(fee: &mut FeeRecord) -> bool {
    if fee.receipt_number.as_deref().is_some_and(|n| !n.trim().is_empty()) {
        return false;
    }

    let Some(note) = fee.payment_note.as_deref() else {
        return false;
    };
    let Some((span, number)) = legacy_note_span(note) else {
        return false;
    };

    let number = number.to_string();
    let remaining = format!("{} {}", &note[..span.start], &note[span.end..]);
    let remaining = remaining.split_whitespace().collect::<Vec<_>>().join(" ");

    fee.receipt_number = Some(number);
    fee.payment_note = (!remaining.is_empty()).then_some(remaining);
    true
}
