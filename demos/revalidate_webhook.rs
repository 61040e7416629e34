//! Axum server that caches page data and exposes a revalidation webhook.
//!
//! ```text
//! GET  /blog/{slug}              cached page data (revalidate: 30s, tag "posts")
//! POST /api/revalidate/{tag}     mark every entry with the tag as stale
//! POST /api/revalidate-path      {"path": "/blog", "layout": true}
//! GET  /api/stats                cache statistics
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use revalidate_kit::observability::LoggingMetrics;
use revalidate_kit::{Cache, CacheConfig, CachePolicy, PathScope};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize, Debug)]
struct Page {
    slug: String,
    title: String,
    rendered_at_ms: u128,
}

#[derive(Deserialize)]
struct RevalidatePath {
    path: String,
    #[serde(default)]
    layout: bool,
}

/// Application state
#[derive(Clone)]
struct AppState {
    cache: Cache,
}

/// Simulated slow upstream.
async fn render_page(slug: String) -> Result<Page, String> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    if slug == "missing" {
        return Err(format!("no page named {}", slug));
    }

    let rendered_at_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    Ok(Page {
        title: format!("Post: {}", slug),
        slug,
        rendered_at_ms,
    })
}

async fn get_page(Path(slug): Path<String>, State(state): State<AppState>) -> Response {
    let key = format!("/blog/{}", slug);
    let fetcher = move || render_page(slug.clone());

    match state
        .cache
        .get_tagged::<Page, _>(
            &key,
            fetcher,
            CachePolicy::Revalidate { seconds: 30.0 },
            &["posts"],
        )
        .await
    {
        Ok(page) => {
            let cache_state = state.cache.state(&key).map(|s| s.to_string());
            (StatusCode::OK, Json(json!({ "page": page, "cache": cache_state }))).into_response()
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": format!("Cache error: {}", e)})),
        )
            .into_response(),
    }
}

async fn revalidate_tag(Path(tag): Path<String>, State(state): State<AppState>) -> Json<serde_json::Value> {
    let revalidated = state.cache.revalidate_tag(&tag);
    Json(json!({ "tag": tag, "revalidated": revalidated }))
}

async fn revalidate_path(
    State(state): State<AppState>,
    Json(body): Json<RevalidatePath>,
) -> Json<serde_json::Value> {
    let scope = if body.layout {
        PathScope::Layout
    } else {
        PathScope::Page
    };
    let revalidated = state.cache.revalidate_path(&body.path, scope);
    Json(json!({ "path": body.path, "revalidated": revalidated }))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.cache.stats();
    Json(json!({
        "entries": stats.total_entries,
        "fresh": stats.fresh_entries,
        "stale": stats.stale_entries,
        "revalidating": stats.revalidating_entries,
        "tags": stats.total_tags,
        "bytes": stats.total_bytes,
        "in_flight": stats.in_flight,
    }))
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    let config = CacheConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Ignoring cache config from environment: {}", e);
        CacheConfig::default()
    });
    let cache = Cache::new()
        .with_config(config)
        .with_metrics(Box::new(LoggingMetrics));

    let state = AppState { cache };

    let app = Router::new()
        .route("/blog/{slug}", get(get_page))
        .route("/api/revalidate/{tag}", post(revalidate_tag))
        .route("/api/revalidate-path", post(revalidate_path))
        .route("/api/stats", get(stats))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .expect("Failed to bind port 3000");

    println!("Server running on http://127.0.0.1:3000");
    println!("Page:       curl http://127.0.0.1:3000/blog/hello-world");
    println!("Revalidate: curl -X POST http://127.0.0.1:3000/api/revalidate/posts");
    println!("Stats:      curl http://127.0.0.1:3000/api/stats");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
