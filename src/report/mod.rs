// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! PDF export of the analysis history

pub mod font;
pub mod pdf;

use chrono::Local;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ReportConfig;
use crate::db::PredictionRecord;
use crate::history::tally;
use crate::store::ImageStore;
use crate::Result;
use font::TrueTypeFont;
use pdf::{PdfWriter, Rgb, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};

const MARGIN: f32 = 10.0;
const BOTTOM_MARGIN: f32 = 15.0;
const BLOCK_WIDTH: f32 = 190.0;
const BLOCK_HEIGHT: f32 = 50.0;
const BLOCK_GAP: f32 = 5.0;
const THUMB_SIZE: f32 = 46.0;
const TEXT_LEFT: f32 = 62.0;
const LINE_HEIGHT: f32 = 8.0;
const THUMB_PIXELS: u32 = 400;

const INK: Rgb = [0.0, 0.0, 0.0];
const TITLE_INK: Rgb = [30.0 / 255.0, 30.0 / 255.0, 30.0 / 255.0];
const BORDER: Rgb = [180.0 / 255.0, 180.0 / 255.0, 180.0 / 255.0];

/// Renders ledger records into a PDF report
pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Render `records` (newest first) with thumbnails taken from `store`
    pub fn render(&self, records: &[PredictionRecord], store: &ImageStore) -> Result<Vec<u8>> {
        let font = TrueTypeFont::load(Path::new(&self.config.font_path))?;
        let mut pdf = PdfWriter::new(&font);

        pdf.add_page();
        let title_width = pdf.text_width(&self.config.title, 18.0)?;
        pdf.text(
            (PAGE_WIDTH_MM - title_width) / 2.0,
            baseline(MARGIN, 15.0, 18.0),
            18.0,
            TITLE_INK,
            &self.config.title,
        )?;

        let mut y = MARGIN + 15.0 + 8.0;
        for record in records {
            if y + BLOCK_HEIGHT > PAGE_HEIGHT_MM - BOTTOM_MARGIN {
                pdf.add_page();
                y = MARGIN;
            }
            self.render_record(&mut pdf, record, store, y)?;
            y += BLOCK_HEIGHT + BLOCK_GAP;
        }

        pdf.add_page();
        y = MARGIN;
        pdf.text(MARGIN, baseline(y, 12.0, 16.0), 16.0, INK, &self.config.summary_title)?;
        y += 12.0;
        for line in summary_lines(records, &self.config.no_data_text) {
            if y + LINE_HEIGHT > PAGE_HEIGHT_MM - BOTTOM_MARGIN {
                pdf.add_page();
                y = MARGIN;
            }
            pdf.text(MARGIN, baseline(y, LINE_HEIGHT, 12.0), 12.0, INK, &line)?;
            y += LINE_HEIGHT;
        }

        let pages = pdf.page_count();
        let bytes = pdf.finish()?;
        info!("Rendered report: {} records, {} pages, {} bytes", records.len(), pages, bytes.len());
        Ok(bytes)
    }

    fn render_record(
        &self,
        pdf: &mut PdfWriter<'_>,
        record: &PredictionRecord,
        store: &ImageStore,
        top: f32,
    ) -> Result<()> {
        pdf.rect(MARGIN, top, BLOCK_WIDTH, BLOCK_HEIGHT, BORDER, 0.3);

        if store.exists(&record.filename) {
            match image::open(store.path_for(&record.filename)) {
                Ok(img) => {
                    let thumb = img.thumbnail(THUMB_PIXELS, THUMB_PIXELS);
                    if let Err(e) = pdf.image(&thumb, MARGIN + 2.0, top + 2.0, THUMB_SIZE, THUMB_SIZE) {
                        debug!("Skipping thumbnail for {}: {}", record.filename, e);
                    }
                }
                Err(e) => debug!("Skipping thumbnail for {}: {}", record.filename, e),
            }
        }

        let max_width = MARGIN + BLOCK_WIDTH - TEXT_LEFT - 2.0;
        let lines = [
            format!("File: {}", record.filename),
            format!("Status: {}", record.result),
            format!("Confidence: {:.2}%", record.confidence),
            format!(
                "Date/time: {}",
                record.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
        ];

        let mut y = top + 4.0;
        for line in &lines {
            let line = fit_text(pdf, line, 12.0, max_width)?;
            pdf.text(TEXT_LEFT, baseline(y, LINE_HEIGHT, 12.0), 12.0, INK, &line)?;
            y += LINE_HEIGHT;
        }
        Ok(())
    }
}

/// Summary lines for the last page: one per label, or the no-data sentence
pub fn summary_lines(records: &[PredictionRecord], no_data_text: &str) -> Vec<String> {
    let tallies = tally(records);
    if tallies.is_empty() {
        return vec![no_data_text.to_string()];
    }
    tallies
        .iter()
        .map(|t| format!("• {}: {} ({:.1}%)", t.label, t.count, t.percent))
        .collect()
}

/// `Content-Disposition` value carrying both an ASCII and a UTF-8 filename
pub fn content_disposition(ascii_filename: &str, display_filename: &str) -> String {
    let ascii: String = ascii_filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"' && *c != '\\')
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(display_filename)
    )
}

// Baseline of text vertically centred in a cell of height `h` starting at `top`
fn baseline(top: f32, h: f32, size_pt: f32) -> f32 {
    let size_mm = pdf::mm(1.0).recip() * size_pt;
    top + h / 2.0 + size_mm * 0.35
}

fn fit_text(pdf: &PdfWriter<'_>, text: &str, size: f32, max_width: f32) -> Result<String> {
    if pdf.text_width(text, size)? <= max_width {
        return Ok(text.to_string());
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + "…";
        if pdf.text_width(&candidate, size)? <= max_width {
            return Ok(candidate);
        }
    }
    Ok(String::new())
}
