//! SQLite adapter: the prediction log and the labeled training table.
//!
//! Two tables:
//! - `predictions_log`: append-only record of every scored request
//! - `features`: `id`, the 13 clinical columns and the `target` label;
//!   clinical cells may be NULL
//!
//! The connection is owned by the `SqliteStorage` handle and protected by a
//! `Mutex`; a poisoned lock surfaces as `StorageError::LockPoisoned`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::domain::{LabeledRecord, PatientRecord, PredictionRecord, RiskLevel, FEATURE_NAMES};
use crate::ports::{PredictionLog, PredictionPage, TrainingSource};

/// Label column of the `features` table.
pub const TARGET_COLUMN: &str = "target";

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Table {table} is missing columns: {}", missing.join(", "))]
    Schema { table: String, missing: Vec<String> },

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// SQLite storage adapter.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection. Tables that already exist are kept as is.
    ///
    /// # Errors
    /// Returns error if the schema cannot be created.
    pub fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let logged_columns: String = FEATURE_NAMES
            .iter()
            .map(|name| format!("    {name} REAL NOT NULL,\n"))
            .collect();
        let feature_columns: String = FEATURE_NAMES
            .iter()
            .map(|name| format!("    {name} REAL,\n"))
            .collect();

        self.conn()?.execute_batch(&format!(
            r"
            CREATE TABLE IF NOT EXISTS predictions_log (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
            {logged_columns}
                prediction INTEGER NOT NULL,
                risk_level TEXT NOT NULL,
                probability REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS features (
                id INTEGER PRIMARY KEY,
            {feature_columns}
                {TARGET_COLUMN} INTEGER NOT NULL
            );
            "
        ))?;
        Ok(())
    }

    /// Insert labeled rows into `features`, replacing rows with the same id.
    ///
    /// # Errors
    /// Returns error if any insert fails; the batch is rolled back.
    pub fn insert_labeled_records(&self, rows: &[LabeledRecord]) -> Result<usize, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let placeholders = (1..=FEATURE_NAMES.len() + 2)
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO features (id, {}, {TARGET_COLUMN}) VALUES ({placeholders})",
                FEATURE_NAMES.join(", ")
            ))?;
            for row in rows {
                let mut values: Vec<Value> = Vec::with_capacity(15);
                values.push(row.id.into());
                values.extend(row.values.iter().map(|&v| Value::from(v)));
                values.push(i64::from(row.label).into());
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        tracing::info!("Inserted {} labeled rows into features", rows.len());
        Ok(rows.len())
    }

    /// Columns of `table` that are required but absent.
    fn missing_columns(conn: &Connection, table: &str, required: &[&str]) -> Result<Vec<String>, StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let present = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(required
            .iter()
            .filter(|c| !present.iter().any(|p| p == *c))
            .map(|c| (*c).to_string())
            .collect())
    }

    fn select_log_columns() -> String {
        format!(
            "SELECT id, created_at, {}, prediction, risk_level, probability FROM predictions_log",
            FEATURE_NAMES.join(", ")
        )
    }

    fn row_to_prediction(row: &Row<'_>) -> rusqlite::Result<PredictionRecord> {
        let invalid = |column: usize, ty: Type, message: String| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                ty,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
            )
        };

        let id: String = row.get(0)?;
        let created_at_str: String = row.get(1)?;
        let mut values = [0.0; 13];
        for (i, value) in values.iter_mut().enumerate() {
            *value = row.get(2 + i)?;
        }
        let code: i64 = row.get(15)?;
        let risk_level_str: String = row.get(16)?;
        let probability: f64 = row.get(17)?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
        let risk_level = RiskLevel::from_code(code)
            .ok_or_else(|| invalid(15, Type::Integer, format!("unknown risk code {code}")))?;
        let label = risk_level_str
            .parse::<RiskLevel>()
            .map_err(|e| invalid(16, Type::Text, e))?;
        if label != risk_level {
            return Err(invalid(
                16,
                Type::Text,
                format!("risk label {risk_level_str} disagrees with code {code}"),
            ));
        }
        let input = PatientRecord::from_vec(&values)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Real, Box::new(e)))?;

        Ok(PredictionRecord {
            id,
            input,
            risk_level,
            probability,
            created_at,
        })
    }
}

impl PredictionLog for SqliteStorage {
    type Error = StorageError;

    fn append(&self, record: &PredictionRecord) -> Result<(), Self::Error> {
        let conn = self.conn()?;
        let placeholders = (1..=FEATURE_NAMES.len() + 5)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO predictions_log (id, created_at, {}, prediction, risk_level, probability) VALUES ({placeholders})",
            FEATURE_NAMES.join(", ")
        );

        let mut values: Vec<Value> = Vec::with_capacity(18);
        values.push(record.id.clone().into());
        values.push(record.created_at.to_rfc3339().into());
        values.extend(record.input.to_vec().into_iter().map(Into::into));
        values.push(i64::from(record.risk_level.code()).into());
        values.push(record.risk_level.to_string().into());
        values.push(record.probability.into());
        conn.execute(&sql, params_from_iter(values))?;

        tracing::debug!("Logged prediction {} ({})", record.id, record.risk_level);
        Ok(())
    }

    fn load_recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, Self::Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY rowid DESC LIMIT ?1",
            Self::select_log_columns()
        ))?;
        let records = stmt
            .query_map(params![limit as i64], Self::row_to_prediction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn load_paginated(&self, offset: usize, limit: usize) -> Result<PredictionPage, Self::Error> {
        let conn = self.conn()?;

        let total_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM predictions_log", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY rowid DESC LIMIT ?1 OFFSET ?2",
            Self::select_log_columns()
        ))?;
        let records = stmt
            .query_map(params![limit as i64, offset as i64], Self::row_to_prediction)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PredictionPage::new(records, total_count as usize, offset, limit))
    }

    fn count(&self) -> Result<usize, Self::Error> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM predictions_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl TrainingSource for SqliteStorage {
    type Error = StorageError;

    fn load_labeled_records(&self) -> Result<Vec<LabeledRecord>, Self::Error> {
        let conn = self.conn()?;

        let mut required: Vec<&str> = vec!["id"];
        required.extend(FEATURE_NAMES);
        required.push(TARGET_COLUMN);
        let missing = Self::missing_columns(&conn, "features", &required)?;
        if !missing.is_empty() {
            return Err(StorageError::Schema {
                table: "features".into(),
                missing,
            });
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT id, {}, {TARGET_COLUMN} FROM features ORDER BY id",
            FEATURE_NAMES.join(", ")
        ))?;
        let raw = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let mut values: [Option<f64>; 13] = [None; 13];
                for (i, value) in values.iter_mut().enumerate() {
                    *value = row.get(1 + i)?;
                }
                let target: i64 = row.get(14)?;
                Ok((id, values, target))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let records = raw
            .into_iter()
            .map(|(id, values, target)| {
                let label = u8::try_from(target).map_err(|_| {
                    StorageError::InvalidRow(format!("features row {id}: target {target}"))
                })?;
                Ok(LabeledRecord { id, values, label })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        let empty_cells: usize = records.iter().map(|r| r.missing_fields().count()).sum();
        tracing::info!(
            "Loaded {} labeled rows from features ({} empty cells)",
            records.len(),
            empty_cells
        );
        Ok(records)
    }
}
