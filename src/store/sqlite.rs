use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::config::{ReceiptFormat, ResetPolicy, SchoolNumbering, SequenceConfig};
use crate::errors::{FeeError, Result};
use crate::types::{DocumentType, RecordRef, RecordType, SchoolId};

use super::{CounterStore, Reservation, SchoolCounters, SequenceState, StoreCapabilities};

/// how long a writer waits on another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS school_settings (
      school_id TEXT PRIMARY KEY,
      receipt_number_prefix TEXT NOT NULL DEFAULT 'REC',
      receipt_number_format TEXT NOT NULL DEFAULT 'auto',
      receipt_number_reset TEXT NOT NULL DEFAULT 'yearly',
      receipt_number_padding INTEGER,
      receipt_number_counter INTEGER NOT NULL DEFAULT 0,
      receipt_number_year INTEGER,
      installment_receipt_number_prefix TEXT NOT NULL DEFAULT 'INS',
      installment_receipt_number_format TEXT NOT NULL DEFAULT 'auto',
      installment_receipt_number_reset TEXT NOT NULL DEFAULT 'yearly',
      installment_receipt_number_padding INTEGER,
      installment_receipt_number_counter INTEGER NOT NULL DEFAULT 0,
      installment_receipt_number_year INTEGER
    );
    CREATE TABLE IF NOT EXISTS fees (
      id TEXT PRIMARY KEY,
      school_id TEXT NOT NULL REFERENCES school_settings (school_id) ON DELETE CASCADE,
      receipt_number TEXT
    );
    CREATE TABLE IF NOT EXISTS installments (
      id TEXT PRIMARY KEY,
      school_id TEXT NOT NULL REFERENCES school_settings (school_id) ON DELETE CASCADE,
      receipt_number TEXT
    );
"#;

/// settings columns backing one sequence
struct SequenceColumns {
    prefix: &'static str,
    format: &'static str,
    reset: &'static str,
    padding: &'static str,
    counter: &'static str,
    year: &'static str,
}

impl SequenceColumns {
    fn of(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::FeeReceipt => Self {
                prefix: "receipt_number_prefix",
                format: "receipt_number_format",
                reset: "receipt_number_reset",
                padding: "receipt_number_padding",
                counter: "receipt_number_counter",
                year: "receipt_number_year",
            },
            DocumentType::InstallmentReceipt => Self {
                prefix: "installment_receipt_number_prefix",
                format: "installment_receipt_number_format",
                reset: "installment_receipt_number_reset",
                padding: "installment_receipt_number_padding",
                counter: "installment_receipt_number_counter",
                year: "installment_receipt_number_year",
            },
        }
    }

    /// column list in `RawSequence::from_row` order
    fn select_list(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}",
            self.prefix, self.format, self.reset, self.padding, self.counter, self.year
        )
    }
}

fn table(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Fee => "fees",
        RecordType::Installment => "installments",
    }
}

/// sequence columns as stored, before validation
struct RawSequence {
    prefix: String,
    format: String,
    reset: String,
    padding: Option<i64>,
    counter: i64,
    year: Option<i32>,
}

impl RawSequence {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            prefix: row.get(0)?,
            format: row.get(1)?,
            reset: row.get(2)?,
            padding: row.get(3)?,
            counter: row.get(4)?,
            year: row.get(5)?,
        })
    }

    fn config(&self) -> Result<SequenceConfig> {
        let format = ReceiptFormat::from_str_opt(&self.format).ok_or_else(|| {
            FeeError::InvalidConfiguration {
                message: format!("unknown receipt number format {:?}", self.format),
            }
        })?;
        let reset_policy = ResetPolicy::from_str_opt(&self.reset).ok_or_else(|| {
            FeeError::InvalidConfiguration {
                message: format!("unknown reset policy {:?}", self.reset),
            }
        })?;
        let pad_width = self
            .padding
            .map(u32::try_from)
            .transpose()
            .map_err(|_| FeeError::InvalidConfiguration {
                message: format!("invalid pad width {:?}", self.padding),
            })?;

        Ok(SequenceConfig {
            prefix: self.prefix.clone(),
            format,
            reset_policy,
            pad_width,
        })
    }

    fn counter(&self) -> Result<u64> {
        u64::try_from(self.counter).map_err(|_| FeeError::InvalidConfiguration {
            message: format!("negative receipt counter {}", self.counter),
        })
    }

    fn into_state(self) -> Result<SequenceState> {
        Ok(SequenceState {
            config: self.config()?,
            counter: self.counter()?,
            year: self.year,
        })
    }
}

/// SQLite-backed counter store
///
/// Counters live on the `school_settings` row, receipt numbers on the `fees`
/// and `installments` rows. Any number of stores may open the same database
/// file; SQLite's write lock serialises their reservations.
pub struct SqliteCounterStore {
    conn: Mutex<Connection>,
    capabilities: StoreCapabilities,
}

impl SqliteCounterStore {
    /// open (and if needed create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// wrap an existing connection, creating missing tables
    ///
    /// Tables that already exist are left as they are; a legacy `fees` or
    /// `installments` table without `receipt_number` is reported through
    /// [`CounterStore::capabilities`].
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        let receipt_number_column = has_column(&conn, "fees", "receipt_number")?
            && has_column(&conn, "installments", "receipt_number")?;
        if !receipt_number_column {
            log::warn!("receipt_number column missing, receipt numbering disabled for this store");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            capabilities: StoreCapabilities {
                atomic_increment: true,
                receipt_number_column,
            },
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| FeeError::StoreUnavailable {
            reason: "sqlite connection lock poisoned".to_string(),
        })
    }

    /// run the counter step inside an immediate transaction
    ///
    /// The UPDATE decides reset vs. increment from the row it modifies, so the
    /// step stays atomic across connections. The preceding SELECT only reports
    /// the year that was replaced.
    fn advance(
        conn: &mut Connection,
        school_id: SchoolId,
        document_type: DocumentType,
        current_year: i32,
    ) -> rusqlite::Result<Option<(RawSequence, Option<i32>)>> {
        let c = SequenceColumns::of(document_type);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous_year: Option<Option<i32>> = tx
            .query_row(
                &format!("SELECT {} FROM school_settings WHERE school_id = ?1", c.year),
                params![school_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(previous_year) = previous_year else {
            return Ok(None);
        };

        let sql = format!(
            "UPDATE school_settings \
             SET {counter} = CASE \
                   WHEN {reset} = 'yearly' AND {year} IS NOT NULL AND {year} < ?2 THEN 1 \
                   ELSE {counter} + 1 \
                 END, \
                 {year} = MAX(COALESCE({year}, ?2), ?2) \
             WHERE school_id = ?1 \
             RETURNING {columns}",
            counter = c.counter,
            reset = c.reset,
            year = c.year,
            columns = c.select_list(),
        );
        let raw = tx.query_row(&sql, params![school_id.to_string(), current_year], RawSequence::from_row)?;

        tx.commit()?;
        Ok(Some((raw, previous_year)))
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(1))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(names.iter().any(|name| name == column))
}

impl CounterStore for SqliteCounterStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn register_school(&self, school_id: SchoolId, numbering: &SchoolNumbering) -> Result<()> {
        numbering.validate()?;
        let fee = SequenceColumns::of(DocumentType::FeeReceipt);
        let installment = SequenceColumns::of(DocumentType::InstallmentReceipt);

        let sql = format!(
            "INSERT INTO school_settings (school_id, {fp}, {ff}, {fr}, {fw}, {ip}, {if_}, {ir}, {iw}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT (school_id) DO UPDATE SET \
               {fp} = excluded.{fp}, {ff} = excluded.{ff}, {fr} = excluded.{fr}, {fw} = excluded.{fw}, \
               {ip} = excluded.{ip}, {if_} = excluded.{if_}, {ir} = excluded.{ir}, {iw} = excluded.{iw}",
            fp = fee.prefix,
            ff = fee.format,
            fr = fee.reset,
            fw = fee.padding,
            ip = installment.prefix,
            if_ = installment.format,
            ir = installment.reset,
            iw = installment.padding,
        );

        let f = &numbering.fee_receipts;
        let i = &numbering.installment_receipts;
        self.conn()?.execute(
            &sql,
            params![
                school_id.to_string(),
                f.prefix,
                f.format.as_str(),
                f.reset_policy.as_str(),
                f.pad_width,
                i.prefix,
                i.format.as_str(),
                i.reset_policy.as_str(),
                i.pad_width,
            ],
        )?;
        Ok(())
    }

    fn import_counter(
        &self,
        school_id: SchoolId,
        document_type: DocumentType,
        counter: u64,
        year: Option<i32>,
    ) -> Result<()> {
        let c = SequenceColumns::of(document_type);
        let counter = i64::try_from(counter).map_err(|_| FeeError::InvalidConfiguration {
            message: format!("receipt counter {} out of range", counter),
        })?;

        let updated = self.conn()?.execute(
            &format!(
                "UPDATE school_settings SET {} = ?2, {} = ?3 WHERE school_id = ?1",
                c.counter, c.year
            ),
            params![school_id.to_string(), counter, year],
        )?;
        if updated == 0 {
            return Err(FeeError::SchoolNotFound { school_id });
        }
        Ok(())
    }

    fn school_counters(&self, school_id: SchoolId) -> Result<SchoolCounters> {
        let fee = SequenceColumns::of(DocumentType::FeeReceipt);
        let installment = SequenceColumns::of(DocumentType::InstallmentReceipt);

        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {}, {} FROM school_settings WHERE school_id = ?1",
                    fee.select_list(),
                    installment.select_list()
                ),
                params![school_id.to_string()],
                |row| {
                    let fee = RawSequence::from_row(row)?;
                    let installment = RawSequence {
                        prefix: row.get(6)?,
                        format: row.get(7)?,
                        reset: row.get(8)?,
                        padding: row.get(9)?,
                        counter: row.get(10)?,
                        year: row.get(11)?,
                    };
                    Ok((fee, installment))
                },
            )
            .optional()?;

        let (fee, installment) = raw.ok_or(FeeError::SchoolNotFound { school_id })?;
        Ok(SchoolCounters {
            school_id,
            fee: fee.into_state()?,
            installment: installment.into_state()?,
        })
    }

    fn reserve_next(
        &self,
        school_id: SchoolId,
        document_type: DocumentType,
        current_year: i32,
    ) -> Result<Reservation> {
        let mut conn = self.conn.lock().map_err(|_| {
            FeeError::reservation_failed(school_id, document_type, "sqlite connection lock poisoned")
        })?;

        let outcome = Self::advance(&mut conn, school_id, document_type, current_year).map_err(|e| {
            log::error!("counter update failed for school {} ({}): {}", school_id, document_type, e);
            FeeError::reservation_failed(school_id, document_type, e.to_string())
        })?;
        let (raw, previous_year) = outcome.ok_or_else(|| {
            FeeError::reservation_failed(school_id, document_type, "no counter row for school")
        })?;

        let config = raw
            .config()
            .map_err(|e| FeeError::reservation_failed(school_id, document_type, e.to_string()))?;
        let sequence = raw
            .counter()
            .map_err(|e| FeeError::reservation_failed(school_id, document_type, e.to_string()))?;
        let reset = config.reset_policy == ResetPolicy::Yearly
            && previous_year.is_some_and(|year| year < current_year);

        Ok(Reservation {
            sequence,
            year: raw.year.unwrap_or(current_year),
            previous_year,
            reset,
            config,
        })
    }

    fn register_record(&self, record: RecordRef, school_id: SchoolId) -> Result<()> {
        self.conn()?.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (id, school_id) VALUES (?1, ?2)",
                table(record.record_type)
            ),
            params![record.id.to_string(), school_id.to_string()],
        )?;
        Ok(())
    }

    fn receipt_number(&self, record: RecordRef) -> Result<Option<String>> {
        let row: Option<Option<String>> = self
            .conn()?
            .query_row(
                &format!("SELECT receipt_number FROM {} WHERE id = ?1", table(record.record_type)),
                params![record.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        row.ok_or(FeeError::RecordNotFound { record_id: record.id })
    }

    fn conditional_set_receipt_number(&self, record: RecordRef, number: &str) -> Result<bool> {
        let conn = self.conn()?;
        let table = table(record.record_type);

        let updated = conn.execute(
            &format!(
                "UPDATE {} SET receipt_number = ?2 \
                 WHERE id = ?1 AND (receipt_number IS NULL OR TRIM(receipt_number) = '')",
                table
            ),
            params![record.id.to_string(), number],
        )?;
        if updated == 1 {
            return Ok(true);
        }

        let exists = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", table),
                params![record.id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            Ok(false)
        } else {
            Err(FeeError::RecordNotFound { record_id: record.id })
        }
    }
}
