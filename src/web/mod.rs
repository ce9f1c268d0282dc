// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP API and dashboard for Leafscan

pub mod error;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::app::{AnalyzeOutcome, AppContext};
use crate::history::{HistoryEntry, LabelTally};
use crate::report::content_disposition;
use crate::store::{sanitize_filename, IMAGE_ROUTE};
pub use error::ApiError;

/// Shared application state
pub type AppState = Arc<AppContext>;

/// Create the web application router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.web.max_upload_bytes;

    // Fixed routes under /history also accept DELETE so records named
    // `export`, `stats` or `image` stay deletable.
    Router::new()
        // Pages
        .route("/", get(index_page))
        // API endpoints
        .route("/analyze", post(api_analyze))
        .route("/history", get(api_get_history).delete(api_clear_history))
        .route(
            "/history/export",
            get(api_export_history).delete(|state: State<AppState>| delete_named(state, "export")),
        )
        .route(
            "/history/stats",
            get(api_get_stats).delete(|state: State<AppState>| delete_named(state, "stats")),
        )
        .route(
            IMAGE_ROUTE,
            delete(|state: State<AppState>| delete_named(state, "image")),
        )
        .route(&format!("{}/*name", IMAGE_ROUTE), get(serve_image))
        .route("/history/:filename", delete(api_delete_record))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === API Handlers ===

async fn api_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeOutcome>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        debug!("Upload {:?}: {} bytes", filename, bytes.len());

        let outcome = state.analyze(filename.as_deref(), bytes.to_vec()).await?;
        return Ok(Json(outcome));
    }

    Err(ApiError::BadRequest("No file in upload".to_string()))
}

async fn api_get_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    Ok(Json(state.history.entries()?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

async fn api_delete_record(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.history.remove(&filename).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn delete_named(
    State(state): State<AppState>,
    filename: &'static str,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.history.remove(filename).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Stored upload, served from the image store
async fn serve_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> Response {
    match sanitize_filename(&name) {
        Ok(key) if key == name => {
            let file = ServeFile::new(state.history.store().path_for(&key));
            match file.oneshot(request).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            }
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn api_clear_history(State(state): State<AppState>) -> Result<Json<SuccessResponse>, ApiError> {
    state.history.clear().await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn api_export_history(State(state): State<AppState>) -> Result<Response, ApiError> {
    let ctx = Arc::clone(&state);
    let pdf = tokio::task::spawn_blocking(move || ctx.export())
        .await
        .map_err(|e| ApiError::Internal(format!("Export task failed: {}", e)))??;

    let report = &state.config.report;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&report.ascii_filename, &report.display_filename),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        pdf,
    )
        .into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total: usize,
    pub labels: Vec<LabelTally>,
}

async fn api_get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let labels = state.history.tallies()?;
    let total = labels.iter().map(|t| t.count).sum();
    Ok(Json(StatsResponse { total, labels }))
}

// === Page Handlers ===

async fn index_page(State(state): State<AppState>) -> Html<String> {
    let entries = state.history.entries().unwrap_or_else(|e| {
        warn!("Failed to load history for dashboard: {}", e);
        Vec::new()
    });
    let tallies = state.history.tallies().unwrap_or_else(|e| {
        warn!("Failed to load tallies for dashboard: {}", e);
        Vec::new()
    });
    Html(render_index(&entries, &tallies))
}

// === Template Rendering ===

fn base_template(title: &str, content: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{} - Leafscan</title>
    <style>
        :root {{
            --bg-primary: #f4f7f2;
            --bg-card: #ffffff;
            --text-primary: #1e1e1e;
            --text-secondary: #6b7280;
            --accent: #2f7d32;
            --border: #d9e2d5;
        }}
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
        }}
        .container {{ max-width: 1100px; margin: 0 auto; padding: 20px; }}
        nav {{
            background: var(--bg-card);
            padding: 15px 20px;
            display: flex;
            align-items: center;
            gap: 30px;
            border-bottom: 1px solid var(--border);
        }}
        nav .logo {{ font-size: 1.5em; font-weight: bold; color: var(--accent); text-decoration: none; }}
        nav a {{ color: var(--text-secondary); text-decoration: none; }}
        .card {{ background: var(--bg-card); border-radius: 12px; padding: 20px; margin-bottom: 20px; }}
        .card h2 {{ margin-bottom: 15px; color: var(--accent); }}
        table {{ width: 100%; border-collapse: collapse; }}
        th, td {{ padding: 10px; text-align: left; border-bottom: 1px solid var(--border); vertical-align: middle; }}
        th {{ color: var(--text-secondary); font-weight: 500; }}
        td img {{ width: 64px; height: 64px; object-fit: cover; border-radius: 6px; }}
        .badge {{ display: inline-block; border: 1px solid var(--border); padding: 2px 10px; border-radius: 6px; }}
    </style>
</head>
<body>
    <nav>
        <a href="/" class="logo">Leafscan</a>
        <a href="/history/export">Export PDF</a>
        <a href="/history/stats">Stats</a>
    </nav>
    <main class="container">
        {}
    </main>
</body>
</html>"#, title, content)
}

fn render_index(entries: &[HistoryEntry], tallies: &[LabelTally]) -> String {
    let rows: String = entries.iter()
        .map(|e| format!(r#"
                <tr>
                    <td><img src="{}" alt=""></td>
                    <td>{}</td>
                    <td><span class="badge">{}</span></td>
                    <td>{:.2}%</td>
                    <td>{}</td>
                </tr>"#,
            escape_html(&e.image_url),
            escape_html(&e.image_id),
            escape_html(&e.status),
            e.confidence,
            e.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
        ))
        .collect();

    let history_html = if rows.is_empty() {
        "<p>No analyses yet.</p>".to_string()
    } else {
        format!(r#"
            <table>
                <tr><th></th><th>File</th><th>Status</th><th>Confidence</th><th>Date</th></tr>
                {}
            </table>"#, rows)
    };

    let tallies_html: String = tallies.iter()
        .map(|t| format!("<tr><td>{}</td><td>{}</td><td>{:.1}%</td></tr>", escape_html(&t.label), t.count, t.percent))
        .collect();

    let content = format!(r#"
        <div class="card">
            <h2>Analyze a leaf</h2>
            <form action="/analyze" method="post" enctype="multipart/form-data">
                <input type="file" name="file" accept="image/*" required>
                <button type="submit">Analyze</button>
            </form>
        </div>
        <div style="display: grid; grid-template-columns: 2fr 1fr; gap: 20px;">
            <div class="card">
                <h2>History</h2>
                {}
            </div>
            <div class="card">
                <h2>Summary</h2>
                <table>
                    <tr><th>Status</th><th>Count</th><th>Share</th></tr>
                    {}
                </table>
            </div>
        </div>
    "#, history_html, tallies_html);

    base_template("History", &content)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Start the web server
pub async fn start_server(context: AppContext) -> crate::Result<()> {
    let addr = format!("{}:{}", context.config.web.host, context.config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web UI available at http://{}", addr);

    let router = create_router(Arc::new(context));
    axum::serve(listener, router).await
        .map_err(|e| crate::LeafscanError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
