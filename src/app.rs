// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Application context shared by request handlers and the CLI

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::classifier::onnx::OnnxClassifier;
use crate::classifier::{Classification, Classifier};
use crate::config::AppConfig;
use crate::db::Database;
use crate::history::History;
use crate::report::ReportGenerator;
use crate::store::{generated_filename, sanitize_filename, ImageStore};
use crate::{LeafscanError, Result};

/// Result of one analyze call as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeOutcome {
    pub class_index: usize,
    pub class_name: String,
    pub confidence: f64,
    /// Key the image was stored under
    pub image_id: String,
}

/// Everything a request needs, built once at startup
pub struct AppContext {
    pub config: AppConfig,
    pub history: History,
    classifier: Arc<dyn Classifier>,
}

impl AppContext {
    pub fn new(config: AppConfig, history: History, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            config,
            history,
            classifier,
        }
    }

    /// Open the database and image store and load the model named in `config`
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let history = open_history(&config)?;
        let classifier = OnnxClassifier::load(&config.model)?;
        Ok(Self::new(config, history, Arc::new(classifier)))
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Classify an upload, store it and record the result
    pub async fn analyze(&self, filename: Option<&str>, bytes: Vec<u8>) -> Result<AnalyzeOutcome> {
        let name = match filename.map(sanitize_filename) {
            Some(Ok(name)) => name,
            Some(Err(_)) | None => generated_filename(&bytes),
        };

        let classifier = Arc::clone(&self.classifier);
        let (bytes, classification) = tokio::task::spawn_blocking(move || {
            let result = classifier.classify_bytes(&bytes);
            (bytes, result)
        })
        .await
        .map_err(|e| LeafscanError::Inference(format!("Inference task failed: {}", e)))?;
        let classification: Classification = classification?;

        self.history.record(&name, &bytes, &classification).await?;

        Ok(AnalyzeOutcome {
            class_index: classification.class_index,
            class_name: classification.class_name,
            confidence: classification.confidence,
            image_id: name,
        })
    }

    /// Render the full history as a PDF
    pub fn export(&self) -> Result<Vec<u8>> {
        let records = self.history.records()?;
        ReportGenerator::new(self.config.report.clone()).render(&records, self.history.store())
    }
}

/// History over the configured database and upload directory
pub fn open_history(config: &AppConfig) -> Result<History> {
    let ledger = Database::open(&config.database.path)?;
    let store = ImageStore::open(&config.storage.upload_dir)?;
    info!(
        "History: database {}, images in {}",
        config.database.path, config.storage.upload_dir
    );
    Ok(History::new(ledger, store, config.web.base_url()))
}
