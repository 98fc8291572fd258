//! HTTP API for the compression engine.
//!
//! Routes:
//! - POST /v1/cache/compress
//! - GET /health
//!
//! The wire format mirrors the dashboard client's contract: camelCase
//! fields, a `result` envelope on success, and `{ "error": ... }` with an
//! appropriate status on failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::attention::Aggregation;
use crate::engine::compressor::{CompressError, CompressionConfig, Compressor};
use crate::engine::matrix::Matrix;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub compressor: Compressor,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/cache/compress", post(compress))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Compression request.
#[derive(Debug, Deserialize)]
pub struct CompressRequest {
    /// N x d key vectors.
    pub keys: Vec<Vec<f64>>,

    /// N x d' value vectors.
    pub values: Vec<Vec<f64>>,

    /// M x d query vectors.
    pub queries: Vec<Vec<f64>>,

    pub config: CompressRequestConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressRequestConfig {
    /// Fraction of attention mass to retain, in (0, 1].
    pub attention_threshold: f64,

    /// Optional aggregation override; server default applies when absent.
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
}

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct CompressResponse {
    pub result: CompressResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResult {
    /// Original serialized size in bytes (keys + values at f64 width).
    pub original_size: usize,

    /// Serialized size of the retained subset in bytes.
    pub compressed_size: usize,

    /// `1 - compressedTokens/originalTokens`, in [0, 1).
    pub compression_ratio: f64,

    /// Percentage of bytes saved.
    pub bandwidth_savings: f64,

    /// Processing time in seconds.
    pub processing_time: f64,

    /// Retained token indices, ascending.
    pub retained_indices: Vec<usize>,

    pub stats: CompressStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressStats {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub cumulative_attention: f64,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub version: String,
}

// ─── Error Mapping ─────────────────────────────────────────────────────────

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    Compress(CompressError),
    TooLarge(String),
    Internal(String),
}

impl From<CompressError> for ApiError {
    fn from(err: CompressError) -> Self {
        ApiError::Compress(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Compress(CompressError::Cancelled) => (
                StatusCode::REQUEST_TIMEOUT,
                CompressError::Cancelled.to_string(),
            ),
            ApiError::Compress(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::TooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn compress(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompressRequest>,
) -> Result<Json<CompressResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();

    info!(
        request_id = %request_id,
        tokens = req.keys.len(),
        queries = req.queries.len(),
        threshold = req.config.attention_threshold,
        "Compression request"
    );

    check_limits(&req, &state.config)?;

    let keys = Matrix::from_rows(req.keys).map_err(CompressError::from)?;
    let values = Matrix::from_rows(req.values).map_err(CompressError::from)?;
    let queries = Matrix::from_rows(req.queries).map_err(CompressError::from)?;

    let config = CompressionConfig {
        attention_threshold: req.config.attention_threshold,
        aggregation: req
            .config
            .aggregation
            .unwrap_or(state.config.engine.default_aggregation),
    };

    let original_size = keys.byte_size() + values.byte_size();
    let deadline =
        Instant::now() + Duration::from_secs(state.config.server.request_timeout_secs);

    // The engine is synchronous and CPU-bound; keep it off the async
    // worker threads.
    let compressor = state.compressor;
    let result = tokio::task::spawn_blocking(move || {
        compressor.compress_with_deadline(&keys, &values, &queries, &config, Some(deadline))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("compression task failed: {e}")))?;

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "Compression rejected");
            return Err(err.into());
        }
    };

    let compressed_size =
        result.compressed_keys.byte_size() + result.compressed_values.byte_size();
    let bandwidth_savings = if original_size > 0 {
        (1.0 - compressed_size as f64 / original_size as f64) * 100.0
    } else {
        0.0
    };

    info!(
        request_id = %request_id,
        original_tokens = result.stats.original_token_count,
        compressed_tokens = result.stats.compressed_token_count,
        ratio = result.stats.compression_ratio,
        "Compression complete"
    );

    Ok(Json(CompressResponse {
        result: CompressResult {
            original_size,
            compressed_size,
            compression_ratio: result.stats.compression_ratio,
            bandwidth_savings,
            processing_time: result.stats.processing_time_ms / 1000.0,
            retained_indices: result.retained_indices,
            stats: CompressStats {
                original_tokens: result.stats.original_token_count,
                compressed_tokens: result.stats.compressed_token_count,
                cumulative_attention: result.stats.cumulative_attention_retained,
            },
        },
    }))
}

fn check_limits(req: &CompressRequest, config: &Config) -> Result<(), ApiError> {
    let limits = &config.server;

    if req.keys.len() > limits.max_tokens {
        return Err(ApiError::TooLarge(format!(
            "{} tokens exceeds the limit of {}",
            req.keys.len(),
            limits.max_tokens
        )));
    }
    if req.queries.len() > limits.max_queries {
        return Err(ApiError::TooLarge(format!(
            "{} queries exceeds the limit of {}",
            req.queries.len(),
            limits.max_queries
        )));
    }

    let widest = req
        .keys
        .iter()
        .chain(&req.values)
        .chain(&req.queries)
        .map(|row| row.len())
        .max()
        .unwrap_or(0);
    if widest > limits.max_dim {
        return Err(ApiError::TooLarge(format!(
            "vector dimension {widest} exceeds the limit of {}",
            limits.max_dim
        )));
    }

    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
