// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP API tests against the full router with a stand-in classifier

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use image::DynamicImage;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

use leafscan::classifier::{Classification, Classifier};
use leafscan::config::AppConfig;
use leafscan::db::Database;
use leafscan::history::History;
use leafscan::store::ImageStore;
use leafscan::web::create_router;
use leafscan::{AppContext, Result};

const BOUNDARY: &str = "leafscan-test-boundary";
const FIXTURE_FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSans.ttf");

/// Picks the class from the image width so tests can steer the label
struct WidthClassifier {
    labels: Vec<String>,
}

impl Classifier for WidthClassifier {
    fn name(&self) -> &'static str {
        "width"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn classify(&self, image: &DynamicImage) -> Result<Classification> {
        let class_index = image.width() as usize % self.labels.len();
        Ok(Classification {
            class_index,
            class_name: self.labels[class_index].clone(),
            confidence: 91.25,
        })
    }
}

struct TestApp {
    router: Router,
    context: Arc<AppContext>,
    _dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    test_app_with_font(Some(FIXTURE_FONT))
}

fn test_app_with_font(font: Option<&str>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.database.path = dir.path().join("leafscan.db").to_string_lossy().into_owned();
    config.storage.upload_dir = dir.path().join("images").to_string_lossy().into_owned();
    config.report.font_path = match font {
        Some(path) => path.to_string(),
        None => dir.path().join("fonts/missing.ttf").to_string_lossy().into_owned(),
    };

    let history = History::new(
        Database::open(&config.database.path).unwrap(),
        ImageStore::open(&config.storage.upload_dir).unwrap(),
        config.web.base_url(),
    );
    let classifier = Arc::new(WidthClassifier {
        labels: config.model.classes.clone(),
    });

    let context = Arc::new(AppContext::new(config, history, classifier));
    TestApp {
        router: create_router(Arc::clone(&context)),
        context,
        _dir: dir,
    }
}

fn png(width: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::from_pixel(width, 8, image::Rgb([40, 150, 60]))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart_body(field: &str, filename: Option<&str>, bytes: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
        None => format!("form-data; name=\"{}\"", field),
    };
    let mut body = format!(
        "--{}\r\nContent-Disposition: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, disposition
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload(field: &str, filename: Option<&str>, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, filename, bytes)))
        .unwrap()
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send_full(app: &TestApp, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let (status, _, body) = send_full(app, req).await;
    (status, body)
}

async fn send_json(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn stored_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_analyze_then_history() {
    let app = test_app();

    let (status, outcome) = send_json(&app, upload("file", Some("leaf.png"), &png(5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["class_index"], 1);
    assert_eq!(outcome["class_name"], "Plant under stress");
    assert_eq!(outcome["confidence"], 91.25);
    assert_eq!(outcome["image_id"], "leaf.png");

    let (status, history) = send_json(&app, request(Method::GET, "/history")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["imageId"], "leaf.png");
    assert_eq!(entries[0]["status"], "Plant under stress");
    assert_eq!(entries[0]["confidence"], 91.25);
    assert_eq!(entries[0]["imageUrl"], "http://127.0.0.1:8000/history/image/leaf.png");
    assert!(entries[0]["timestamp"].is_string());
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let app = test_app();

    send(&app, upload("file", Some("first.png"), &png(4))).await;
    send(&app, upload("file", Some("second.png"), &png(6))).await;

    let (_, history) = send_json(&app, request(Method::GET, "/history")).await;
    let names: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["imageId"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["second.png", "first.png"]);
}

#[tokio::test]
async fn test_stored_image_is_served() {
    let app = test_app();
    let bytes = png(3);

    send(&app, upload("file", Some("leaf.png"), &bytes)).await;

    let (status, body) = send(&app, request(Method::GET, "/history/image/leaf.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, bytes);

    let (status, _) = send(&app, request(Method::GET, "/history/image/other.png")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request(Method::GET, "/history/image/..%2Fleafscan.db")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let app = test_app();
    let images = app.context.history.store().root().to_path_buf();

    send(&app, upload("file", Some("leaf.png"), &png(3))).await;
    assert_eq!(stored_files(&images), 1);

    for _ in 0..2 {
        let (status, body) = send_json(&app, request(Method::DELETE, "/history/leaf.png")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    let (_, history) = send_json(&app, request(Method::GET, "/history")).await;
    assert!(history.as_array().unwrap().is_empty());
    assert_eq!(stored_files(&images), 0);
}

#[tokio::test]
async fn test_delete_removes_one_duplicate() {
    let app = test_app();

    send(&app, upload("file", Some("leaf.png"), &png(3))).await;
    send(&app, upload("file", Some("leaf.png"), &png(4))).await;

    send(&app, request(Method::DELETE, "/history/leaf.png")).await;

    let (_, history) = send_json(&app, request(Method::GET, "/history")).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_history() {
    let app = test_app();
    let images = app.context.history.store().root().to_path_buf();

    send(&app, upload("file", Some("a.png"), &png(1))).await;
    send(&app, upload("file", Some("b.png"), &png(2))).await;
    assert_eq!(stored_files(&images), 2);

    let (status, body) = send_json(&app, request(Method::DELETE, "/history")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, history) = send_json(&app, request(Method::GET, "/history")).await;
    assert!(history.as_array().unwrap().is_empty());
    assert_eq!(stored_files(&images), 0);
    assert!(images.is_dir());
}

#[tokio::test]
async fn test_stats() {
    let app = test_app();

    send(&app, upload("file", Some("a.png"), &png(4))).await;
    send(&app, upload("file", Some("b.png"), &png(8))).await;
    send(&app, upload("file", Some("c.png"), &png(5))).await;

    let (status, stats) = send_json(&app, request(Method::GET, "/history/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 3);

    let labels = stats["labels"].as_array().unwrap();
    assert_eq!(labels.len(), 2);
    let healthy = labels.iter().find(|t| t["label"] == "Healthy plant").unwrap();
    assert_eq!(healthy["count"], 2);
    let percent = healthy["percent"].as_f64().unwrap();
    assert!((percent - 200.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_file_field_is_bad_request() {
    let app = test_app();

    let (status, body) = send_json(&app, upload("note", None, b"hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_undecodable_upload_stores_nothing() {
    let app = test_app();
    let images = app.context.history.store().root().to_path_buf();

    let (status, body) = send_json(&app, upload("file", Some("leaf.jpg"), b"not an image")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");

    assert_eq!(stored_files(&images), 0);
    assert_eq!(app.context.history.ledger().count().unwrap(), 0);
}

#[tokio::test]
async fn test_upload_name_is_sanitized_or_generated() {
    let app = test_app();

    let (status, outcome) = send_json(&app, upload("file", Some("../../etc/leaf.png"), &png(3))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["image_id"], "leaf.png");

    let (status, outcome) = send_json(&app, upload("file", Some(""), &png(3))).await;
    assert_eq!(status, StatusCode::OK);
    let generated = outcome["image_id"].as_str().unwrap();
    assert!(generated.starts_with("upload-"));
    assert!(generated.ends_with(".png"));
    assert!(app.context.history.store().exists(generated));
}

#[tokio::test]
async fn test_delete_records_named_like_fixed_routes() {
    let app = test_app();
    let images = app.context.history.store().root().to_path_buf();

    for name in ["export", "stats", "image"] {
        let (status, _) = send(&app, upload("file", Some(name), &png(2))).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(app.context.history.ledger().count().unwrap(), 3);

    for name in ["export", "stats", "image"] {
        let uri = format!("/history/{}", name);
        let (status, body) = send_json(&app, request(Method::DELETE, &uri)).await;
        assert_eq!(status, StatusCode::OK, "DELETE {}", uri);
        assert_eq!(body["success"], true);
    }

    assert_eq!(app.context.history.ledger().count().unwrap(), 0);
    assert_eq!(stored_files(&images), 0);
}

#[tokio::test]
async fn test_delete_with_path_separator_touches_nothing() {
    let app = test_app();

    send(&app, upload("file", Some("leaf.png"), &png(3))).await;

    let (status, body) = send_json(&app, request(Method::DELETE, "/history/sub%2Fleaf.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    assert_eq!(app.context.history.ledger().count().unwrap(), 1);
    assert!(app.context.history.store().exists("leaf.png"));
}

#[tokio::test]
async fn test_export_with_records() {
    let app = test_app();

    send(&app, upload("file", Some("leaf.png"), &png(3))).await;
    send(&app, upload("file", Some("mold.png"), &png(6))).await;

    let (status, headers, body) = send_full(&app, request(Method::GET, "/history/export")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");

    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"blueberry_report.pdf\"; filename*=UTF-8''"));
    let encoded = disposition.rsplit("''").next().unwrap();
    assert_eq!(urlencoding::decode(encoded).unwrap(), "Анализ_голубики_отчет.pdf");

    assert!(body.starts_with(b"%PDF-"));
    let doc = lopdf::Document::load_mem(&body).unwrap();
    // both records fit on the first page, then the summary
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn test_export_empty_history() {
    let app = test_app();

    let (status, headers, body) = send_full(&app, request(Method::GET, "/history/export")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");

    let doc = lopdf::Document::load_mem(&body).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn test_export_without_font_fails() {
    let app = test_app_with_font(None);

    send(&app, upload("file", Some("leaf.png"), &png(3))).await;

    let (status, body) = send_json(&app, request(Method::GET, "/history/export")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");
}

#[tokio::test]
async fn test_dashboard_lists_history() {
    let app = test_app();

    send(&app, upload("file", Some("leaf.png"), &png(3))).await;

    let (status, body) = send(&app, request(Method::GET, "/")).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("leaf.png"));
    assert!(html.contains("Lack of moisture (overdried)"));
}

#[tokio::test]
async fn test_dashboard_survives_unreadable_ledger() {
    let app = test_app();
    send(&app, upload("file", Some("leaf.png"), &png(3))).await;

    let side = rusqlite::Connection::open(&app.context.config.database.path).unwrap();
    side.execute_batch("DROP TABLE predictions").unwrap();

    let (status, _) = send(&app, request(Method::GET, "/history")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = send(&app, request(Method::GET, "/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("No analyses yet."));
}
