// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Leafscan: plant-leaf health classifier
//!
//! Classifies leaf photos with a pretrained ONNX model, keeps a ledger of
//! every prediction, and exports that history as a PDF report.

pub mod app;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod report;
pub mod store;
pub mod web;

pub use app::AppContext;
pub use config::AppConfig;
pub use error::{LeafscanError, Result};
