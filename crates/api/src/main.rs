mod cache;
mod config;
mod metrics;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use extract::{Artifact, Classification, Extractor, ProcessedMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::cache::{Cache, CacheStats};
use crate::config::{AppConfig, LoggingConfig};
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};

struct AppState {
    extractor: Extractor,
    cache: Option<Cache>,
    metrics: Arc<Metrics>,
}

impl AppState {
    fn new(config: &AppConfig) -> Self {
        Self {
            extractor: Extractor::new(config.pipeline.clone()),
            cache: config
                .cache
                .enabled
                .then(|| Cache::new(config.cache.max_entries)),
            metrics: Metrics::new(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize, Deserialize)]
struct ProcessRequest {
    /// Raw backend response: a string, or an object with `answer`/`llm_payload`/`datasets`.
    payload: Value,
    #[serde(default)]
    prior_artifacts: Vec<Artifact>,
    #[serde(default)]
    type_hint: Option<String>,
}

#[derive(Deserialize)]
struct ClassifyRequest {
    content: Value,
    #[serde(default)]
    type_hint: Option<String>,
    #[serde(default)]
    artifact: Option<Value>,
}

#[derive(Serialize)]
struct StatsResponse {
    metrics: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<CacheStats>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let state = Arc::new(AppState::new(&config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!(bind = %config.server.bind, "Server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/process", post(process_message))
        .route("/classify", post(classify_content))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn process_message(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessedMessage>, StatusCode> {
    let request_id = Uuid::new_v4();

    let Json(req) = body.map_err(|rejection| {
        warn!(%request_id, error = %rejection, "Rejected process request");
        state.metrics.record_request(false);
        rejection.status()
    })?;

    let cache_key = match &state.cache {
        Some(_) => Some(serde_json::to_string(&req).map_err(|e| {
            warn!(%request_id, error = %e, "Failed to serialize cache key");
            state.metrics.record_request(false);
            StatusCode::INTERNAL_SERVER_ERROR
        })?),
        None => None,
    };

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        if let Some(hit) = cache.get(key) {
            debug!(%request_id, "Serving processed message from cache");
            state.metrics.record_cache_hit();
            state.metrics.record_request(true);
            return Ok(Json(hit));
        }
    }

    let timer = TimedOperation::start();
    let message = state
        .extractor
        .process(&req.payload, &req.prior_artifacts, req.type_hint.as_deref());
    state.metrics.record_process(timer.elapsed(), &message.report);
    state.metrics.record_request(true);

    info!(
        %request_id,
        kind = ?message.report.kind,
        artifacts = message.artifacts.len(),
        blocks_failed = message.report.blocks_failed,
        "Processed message"
    );

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        cache.set(key, message.clone());
    }

    Ok(Json(message))
}

async fn classify_content(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<Classification>, StatusCode> {
    let Json(req) = body.map_err(|rejection| {
        state.metrics.record_request(false);
        rejection.status()
    })?;

    let classification = extract::classify(&req.content, req.type_hint.as_deref(), req.artifact.as_ref());
    state.metrics.record_request(true);
    Ok(Json(classification))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        metrics: state.metrics.snapshot(),
        cache: state.cache.as_ref().map(Cache::stats),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState::new(&AppConfig::default())))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_process_builds_artifacts() {
        let answer = "Budget: <ui-table data-id=\"budget-h1\"/>\n\
            [DATASETS_JSON_START]{\"datasets\": {\"budget-h1\": {\"type\": \"table\", \"columns\": [\"Line\", \"SAR\"], \"rows\": [[\"Ops\", 10]]}}}[DATASETS_JSON_END]";
        let response = app()
            .oneshot(post_json("/process", json!({"payload": {"answer": answer}})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["artifacts"][0]["artifact_type"], "TABLE");
        assert_eq!(body["artifacts"][0]["title"], "Budget H1");
        assert!(body["cleanedText"].as_str().unwrap().contains("visualization-placeholder"));
        assert_eq!(body["report"]["blocksRecovered"], 1);
    }

    #[tokio::test]
    async fn test_process_rejects_bad_json() {
        let request = Request::builder()
            .method("POST")
            .uri("/process")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{oops"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_repeat_request_served_from_cache() {
        let state = Arc::new(AppState::new(&AppConfig::default()));
        let body = json!({"payload": "Plain narrative.", "prior_artifacts": []});

        for _ in 0..2 {
            let response = router(state.clone())
                .oneshot(post_json("/process", body.clone()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let snapshot = state.metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.cached_responses, 1);
    }

    #[tokio::test]
    async fn test_classify_endpoint() {
        let response = app()
            .oneshot(post_json("/classify", json!({"content": "SELECT 1", "type_hint": null})))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["kind"], "code");
        assert_eq!(body["language"], "sql");
    }

    #[tokio::test]
    async fn test_stats_without_cache() {
        let app = router(Arc::new(AppState::new(&AppConfig::strict_mode())));
        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["metrics"]["total_requests"], 0);
        assert!(body.get("cache").is_none());
    }
}
