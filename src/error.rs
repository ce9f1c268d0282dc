// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Leafscan

use thiserror::Error;

/// Result type alias for Leafscan operations
pub type Result<T> = std::result::Result<T, LeafscanError>;

/// Leafscan error types
#[derive(Error, Debug)]
pub enum LeafscanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Font not found: {0}")]
    FontNotFound(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<lopdf::Error> for LeafscanError {
    fn from(err: lopdf::Error) -> Self {
        LeafscanError::Report(err.to_string())
    }
}
