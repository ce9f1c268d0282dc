// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Leafscan

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Uploaded image storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Classifier model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// PDF report settings
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Base URL used when building image links; derived from host and port when unset
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Path to the ONNX export of the classifier
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    /// Square input resolution in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    /// Class labels, in the order of the model's output logits
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_font_path")]
    pub font_path: String,
    #[serde(default = "default_report_title")]
    pub title: String,
    #[serde(default = "default_summary_title")]
    pub summary_title: String,
    #[serde(default = "default_no_data_text")]
    pub no_data_text: String,
    #[serde(default = "default_ascii_filename")]
    pub ascii_filename: String,
    #[serde(default = "default_display_filename")]
    pub display_filename: String,
}

// Default value functions
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8000 }
fn default_max_upload_bytes() -> usize { 32 * 1024 * 1024 }
fn default_db_path() -> String { "leafscan.db".to_string() }
fn default_upload_dir() -> String { "images".to_string() }
fn default_model_path() -> String { "model.onnx".to_string() }
fn default_input_name() -> String { "input".to_string() }
fn default_input_size() -> u32 { 224 }
fn default_intra_threads() -> usize { 4 }
fn default_font_path() -> String { "fonts/DejaVuSans.ttf".to_string() }
fn default_report_title() -> String { "Plant analysis history".to_string() }
fn default_summary_title() -> String { "Analysis summary".to_string() }
fn default_no_data_text() -> String { "No data available for analysis.".to_string() }
fn default_ascii_filename() -> String { "blueberry_report.pdf".to_string() }
fn default_display_filename() -> String { "Анализ_голубики_отчет.pdf".to_string() }

fn default_classes() -> Vec<String> {
    vec![
        "Healthy plant",
        "Plant under stress",
        "Signs of mold",
        "Lack of moisture (overdried)",
    ].into_iter().map(String::from).collect()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            public_url: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_name: default_input_name(),
            input_size: default_input_size(),
            intra_threads: default_intra_threads(),
            classes: default_classes(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            font_path: default_font_path(),
            title: default_report_title(),
            summary_title: default_summary_title(),
            no_data_text: default_no_data_text(),
            ascii_filename: default_ascii_filename(),
            display_filename: default_display_filename(),
        }
    }
}

impl WebConfig {
    /// Base URL for links handed back to clients, without a trailing slash
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::LeafscanError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> crate::Result<()> {
        if self.model.classes.is_empty() {
            return Err(crate::LeafscanError::Config("model.classes must not be empty".to_string()));
        }
        if self.model.input_size == 0 {
            return Err(crate::LeafscanError::Config("model.input_size must be positive".to_string()));
        }
        if !self.report.ascii_filename.is_ascii() {
            return Err(crate::LeafscanError::Config(
                "report.ascii_filename must be plain ASCII".to_string(),
            ));
        }
        Ok(())
    }
}
