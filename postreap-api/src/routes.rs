//! Routes
//!
//! | route | purpose |
//! |---|---|
//! | `GET /` | banner and endpoint list |
//! | `POST /scrape` | start a keyword job |
//! | `GET /status/:keyword` | job status |
//! | `GET /results/:keyword` | stored result record |
//! | `GET /results` | every stored result |
//! | `DELETE /results/:keyword` | forget a keyword |
//! | `GET /health` | liveness and counters |
//! | `GET /keywords` | keywords with results |

use axum::extract::{Path, State};
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use postreap_core::{ServerSettings, DEFAULT_TARGET_POSTS};
use postreap_runtime::{keyword_key, JobRunner, ScrapeOutcome, Submission};

use crate::ApiError;

/// Body of `POST /scrape`
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequest {
    pub input_keyword: String,
    #[serde(default = "default_target_posts")]
    pub target_posts: usize,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_target_posts() -> usize {
    DEFAULT_TARGET_POSTS
}

fn default_headless() -> bool {
    true
}

fn now() -> String {
    Local::now().to_rfc3339()
}

/// CORS layer allowing the configured origins; any origin if none are set
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Build the router over a job runner
pub fn router(runner: JobRunner, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/scrape", post(start_scrape))
        .route("/status/:keyword", get(scrape_status))
        .route("/results", get(all_results))
        .route("/results/:keyword", get(keyword_results).delete(delete_results))
        .route("/health", get(health))
        .route("/keywords", get(keywords))
        .layer(cors_layer(allowed_origins))
        .with_state(runner)
}

/// Bind and serve until the process is stopped
pub async fn serve(settings: &ServerSettings, runner: JobRunner) -> Result<(), ApiError> {
    let app = router(runner, &settings.allowed_origins);
    let addr = format!("{}:{}", settings.host, settings.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "postreap post-link scraping API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /scrape": "Start scraping for a keyword",
            "GET /status/{keyword}": "Check scraping status",
            "GET /results/{keyword}": "Get results for a keyword",
            "GET /results": "Get all results",
            "DELETE /results/{keyword}": "Delete results for a keyword",
            "GET /health": "Health check",
            "GET /keywords": "List keywords with results",
        }
    }))
}

async fn start_scrape(
    State(runner): State<JobRunner>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.input_keyword.trim().is_empty() {
        return Err(ApiError::BadRequest("input_keyword must not be empty".to_string()));
    }
    if request.target_posts == 0 {
        return Err(ApiError::BadRequest("target_posts must be positive".to_string()));
    }

    let body = match runner.submit(&request.input_keyword, request.target_posts, request.headless) {
        Submission::AlreadyRunning { key } => json!({
            "success": false,
            "message": format!("Scraping already in progress for keyword: {}", key),
            "status": "in_progress",
        }),
        Submission::Started { key, .. } => json!({
            "success": true,
            "message": format!("Started scraping for keyword: {}", key),
            "keyword": key,
            "target_posts": request.target_posts,
            "status": "in_progress",
        }),
    };
    Ok(Json(body))
}

async fn scrape_status(State(runner): State<JobRunner>, Path(keyword): Path<String>) -> Json<Value> {
    let key = keyword_key(&keyword);
    let status = runner.store().status(&key);
    Json(json!({
        "keyword": key,
        "status": status,
        "timestamp": now(),
    }))
}

async fn keyword_results(
    State(runner): State<JobRunner>,
    Path(keyword): Path<String>,
) -> Result<Json<ScrapeOutcome>, ApiError> {
    let key = keyword_key(&keyword);
    match runner.store().outcome(&key) {
        None => Err(ApiError::NotFound(key)),
        Some(ScrapeOutcome::Failure(failure)) => Err(ApiError::JobFailed(failure.error)),
        Some(outcome) => Ok(Json(outcome)),
    }
}

async fn all_results(State(runner): State<JobRunner>) -> Json<Value> {
    let results = runner.store().outcomes();
    Json(json!({
        "total_keywords": results.len(),
        "results": results,
    }))
}

async fn delete_results(
    State(runner): State<JobRunner>,
    Path(keyword): Path<String>,
) -> Json<Value> {
    let key = keyword_key(&keyword);
    if runner.store().remove(&key) {
        info!("Deleted results for '{}'", key);
    } else {
        debug!("No results to delete for '{}'", key);
    }
    Json(json!({
        "message": format!("Results deleted for keyword: {}", key),
    }))
}

async fn health(State(runner): State<JobRunner>) -> Json<Value> {
    let store = runner.store();
    Json(json!({
        "status": "healthy",
        "timestamp": now(),
        "active_scraping_tasks": store.active_count(),
        "total_results": store.result_count(),
    }))
}

async fn keywords(State(runner): State<JobRunner>) -> Json<Value> {
    let keywords = runner.store().keywords();
    Json(json!({
        "count": keywords.len(),
        "keywords": keywords,
    }))
}
