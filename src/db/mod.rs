// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Prediction ledger backed by SQLite

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::{LeafscanError, Result};

/// Database manager for Leafscan (thread-safe wrapper)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// One analyzed image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub filename: String,
    pub result: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub content_hash: String,
}

impl Database {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LeafscanError::Config("Database lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                result TEXT NOT NULL,
                confidence REAL NOT NULL,
                timestamp TEXT NOT NULL,
                content_hash TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_filename ON predictions(filename);
            CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON predictions(timestamp);
        "#)?;
        Ok(())
    }

    /// Insert a prediction; committed immediately
    pub fn append(
        &self,
        filename: &str,
        result: &str,
        confidence: f64,
        timestamp: DateTime<Utc>,
        content_hash: &str,
    ) -> Result<PredictionRecord> {
        // Ledger stores microsecond precision
        let timestamp = timestamp.trunc_subsecs(6);
        let conn = self.lock_conn()?;
        conn.execute(
            r#"INSERT INTO predictions (filename, result, confidence, timestamp, content_hash)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![filename, result, confidence, encode_timestamp(&timestamp), content_hash],
        )?;

        Ok(PredictionRecord {
            id: conn.last_insert_rowid(),
            filename: filename.to_string(),
            result: result.to_string(),
            confidence,
            timestamp,
            content_hash: content_hash.to_string(),
        })
    }

    /// All predictions, newest first
    pub fn list_all_desc(&self) -> Result<Vec<PredictionRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, filename, result, confidence, timestamp, content_hash
               FROM predictions ORDER BY timestamp DESC, id DESC"#
        )?;

        let records = stmt.query_map([], |row| {
            let timestamp: String = row.get(4)?;
            Ok(PredictionRecord {
                id: row.get(0)?,
                filename: row.get(1)?,
                result: row.get(2)?,
                confidence: row.get(3)?,
                timestamp: decode_timestamp(&timestamp),
                content_hash: row.get(5)?,
            })
        })?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Delete the first row recorded under `filename`. Returns false when none matched.
    pub fn delete(&self, filename: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            r#"DELETE FROM predictions WHERE id = (
                   SELECT id FROM predictions WHERE filename = ?1 ORDER BY id LIMIT 1
               )"#,
            params![filename],
        )?;
        Ok(removed > 0)
    }

    /// Delete every row, returning how many were removed
    pub fn delete_all(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let removed = conn.execute("DELETE FROM predictions", [])?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Number of rows per label, most frequent first
    pub fn label_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT result, COUNT(*) AS cnt FROM predictions GROUP BY result ORDER BY cnt DESC, result"#
        )?;
        let counts = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Vacuum database
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }
}

// Fixed-width RFC 3339 so that text ordering in SQL matches time ordering
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!("Unparseable timestamp in ledger: {}", raw);
            DateTime::<Utc>::default()
        })
}
