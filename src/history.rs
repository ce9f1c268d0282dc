// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Analysis history: the ledger and the image store kept side by side
//!
//! Every mutation that touches both the ledger and the store holds the same
//! writer lock, so concurrent uploads or deletes of one filename cannot
//! interleave their blob and row updates. Nothing ties the two together
//! across a crash: a process dying between the blob write and the row insert
//! leaves an orphaned image behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classifier::Classification;
use crate::db::{Database, PredictionRecord};
use crate::store::{sanitize_filename, ImageStore};
use crate::Result;

/// A ledger row as shown to API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub image_id: String,
    pub status: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub image_url: String,
}

/// How often one label occurs across a set of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTally {
    pub label: String,
    pub count: usize,
    /// Share of all records, 0-100
    pub percent: f64,
}

/// History manager over the ledger and the image store
pub struct History {
    ledger: Database,
    store: ImageStore,
    base_url: String,
    write_lock: Mutex<()>,
}

impl History {
    pub fn new(ledger: Database, store: ImageStore, base_url: impl Into<String>) -> Self {
        Self {
            ledger,
            store,
            base_url: base_url.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Database {
        &self.ledger
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Store the uploaded bytes and log the classification
    pub async fn record(
        &self,
        filename: &str,
        bytes: &[u8],
        classification: &Classification,
    ) -> Result<PredictionRecord> {
        let content_hash = blake3::hash(bytes).to_hex().to_string();

        let _guard = self.write_lock.lock().await;
        self.store.put(filename, bytes)?;
        let record = self.ledger.append(
            filename,
            &classification.class_name,
            classification.confidence,
            Utc::now(),
            &content_hash,
        )?;

        info!(
            "Recorded {} as {} ({:.2}%)",
            filename, classification.class_name, classification.confidence
        );
        Ok(record)
    }

    /// All records, newest first
    pub fn records(&self) -> Result<Vec<PredictionRecord>> {
        self.ledger.list_all_desc()
    }

    /// All records in API form, newest first
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.records()?
            .into_iter()
            .map(|r| HistoryEntry {
                image_url: self.store.url_for(&self.base_url, &r.filename),
                image_id: r.filename,
                status: r.result,
                confidence: r.confidence,
                timestamp: r.timestamp,
            })
            .collect())
    }

    /// Drop one record and its image. Absent records and images are not errors.
    ///
    /// The image is only touched when `filename` is already a valid store
    /// key, so a name that merely sanitizes to a stored one leaves both the
    /// row and the blob alone.
    pub async fn remove(&self, filename: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let removed = self.ledger.delete(filename)?;
        debug!("Ledger delete {:?}: removed={}", filename, removed);

        match sanitize_filename(filename) {
            Ok(name) if name == filename => {
                if let Err(e) = self.store.delete(&name) {
                    warn!("Failed to remove image {:?}: {}", name, e);
                }
            }
            _ => debug!("Not touching the store for {:?}", filename),
        }
        Ok(())
    }

    /// Drop every record and every stored image
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let rows = self.ledger.delete_all()?;
        let files = match self.store.delete_all() {
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to list image store: {}", e);
                0
            }
        };
        info!("History cleared ({} records, {} images)", rows, files);
        Ok(())
    }

    /// Per-label counts over the whole ledger
    pub fn tallies(&self) -> Result<Vec<LabelTally>> {
        Ok(tally(&self.records()?))
    }
}

/// Count labels in order of first appearance
pub fn tally(records: &[PredictionRecord]) -> Vec<LabelTally> {
    let mut tallies: Vec<LabelTally> = Vec::new();
    for record in records {
        match tallies.iter_mut().find(|t| t.label == record.result) {
            Some(t) => t.count += 1,
            None => tallies.push(LabelTally {
                label: record.result.clone(),
                count: 1,
                percent: 0.0,
            }),
        }
    }

    let total = records.len() as f64;
    for t in &mut tallies {
        t.percent = t.count as f64 / total * 100.0;
    }
    tallies
}
