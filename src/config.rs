use serde::{Deserialize, Serialize};

use crate::errors::{FeeError, Result};
use crate::types::DocumentType;

/// widest zero padding accepted for a sequence
const MAX_PAD_WIDTH: u32 = 12;

/// how a receipt number string is composed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptFormat {
    /// `{prefix}{sequence}`, e.g. `REC228`
    Auto,
    /// `{prefix}{year}-{sequence}`, e.g. `REC2025-7`
    YearPrefixed,
}

impl ReceiptFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptFormat::Auto => "auto",
            ReceiptFormat::YearPrefixed => "year_prefixed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(ReceiptFormat::Auto),
            "year_prefixed" => Some(ReceiptFormat::YearPrefixed),
            _ => None,
        }
    }
}

/// what happens to the counter when the calendar year moves on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// restart at 1 on the first reservation of a new year
    Yearly,
    /// keep counting across years
    Never,
}

impl ResetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetPolicy::Yearly => "yearly",
            ResetPolicy::Never => "never",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "yearly" => Some(ResetPolicy::Yearly),
            "never" => Some(ResetPolicy::Never),
            _ => None,
        }
    }
}

/// numbering configuration of one receipt sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub prefix: String,
    pub format: ReceiptFormat,
    pub reset_policy: ResetPolicy,
    /// zero-pad the sequence to this many digits
    pub pad_width: Option<u32>,
}

impl SequenceConfig {
    /// plain `{prefix}{sequence}` numbering reset every year
    pub fn auto(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            format: ReceiptFormat::Auto,
            reset_policy: ResetPolicy::Yearly,
            pad_width: None,
        }
    }

    /// year-scoped numbering with a zero-padded sequence
    pub fn year_prefixed(prefix: &str, pad_width: u32) -> Self {
        Self {
            prefix: prefix.to_string(),
            format: ReceiptFormat::YearPrefixed,
            reset_policy: ResetPolicy::Yearly,
            pad_width: Some(pad_width),
        }
    }

    pub fn with_reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    pub fn with_pad_width(mut self, pad_width: u32) -> Self {
        self.pad_width = Some(pad_width);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.chars().any(|c| c.is_whitespace() || c == '-') {
            return Err(FeeError::InvalidConfiguration {
                message: format!("receipt prefix {:?} must not contain whitespace or '-'", self.prefix),
            });
        }

        if let Some(width) = self.pad_width {
            if width == 0 || width > MAX_PAD_WIDTH {
                return Err(FeeError::InvalidConfiguration {
                    message: format!("pad width must be between 1 and {}, got {}", MAX_PAD_WIDTH, width),
                });
            }
        }

        Ok(())
    }
}

/// per-school numbering for both receipt sequences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolNumbering {
    pub fee_receipts: SequenceConfig,
    pub installment_receipts: SequenceConfig,
}

impl SchoolNumbering {
    /// `REC` for fee receipts, `INS` for installment receipts, both auto with yearly reset
    pub fn standard() -> Self {
        Self {
            fee_receipts: SequenceConfig::auto("REC"),
            installment_receipts: SequenceConfig::auto("INS"),
        }
    }

    /// year-scoped numbering for both sequences
    pub fn year_scoped(pad_width: u32) -> Self {
        Self {
            fee_receipts: SequenceConfig::year_prefixed("REC", pad_width),
            installment_receipts: SequenceConfig::year_prefixed("INS", pad_width),
        }
    }

    pub fn sequence(&self, document_type: DocumentType) -> &SequenceConfig {
        match document_type {
            DocumentType::FeeReceipt => &self.fee_receipts,
            DocumentType::InstallmentReceipt => &self.installment_receipts,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.fee_receipts.validate()?;
        self.installment_receipts.validate()
    }

    /// parse and validate settings stored as json
    pub fn from_json(json: &str) -> Result<Self> {
        let numbering: SchoolNumbering = serde_json::from_str(json).map_err(|e| {
            FeeError::InvalidConfiguration {
                message: format!("unreadable numbering settings: {}", e),
            }
        })?;
        numbering.validate()?;
        Ok(numbering)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FeeError::InvalidConfiguration {
            message: e.to_string(),
        })
    }
}

impl Default for SchoolNumbering {
    fn default() -> Self {
        Self::standard()
    }
}
