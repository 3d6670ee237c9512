//! OCR Routes
//!
//! Endpoints:
//! - POST /ocr/infer?preloaded=bool - Run OCR on a batch of base64 images
//! - POST /ocr/load?modality&language&version - Start a worker ahead of time
//! - POST /ocr/unload?modality&language&version - Stop a worker
//! - GET /ocr/loaded - Live workers and pool statistics
//! - GET /ocr/capabilities - Ordered capability rule table

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{CapabilityRule, Language, Modality};
use crate::dispatch::{Level, OcrRequest, OcrResult};
use crate::error::{GatewayError, Result};
use crate::pool::{PoolStats, Readiness, WorkerKey};
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Body of an inference request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferRequest {
    /// Base64 encoded images; `null` entries are rejected by index
    pub image_content: Vec<Option<String>>,
    #[serde(default = "default_modality")]
    pub modality: String,
    pub language: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub level: Level,
    /// Accepted for compatibility; the version selects the model
    #[serde(default)]
    pub modelid: Option<String>,
    #[serde(default = "default_omit")]
    pub omit: bool,
    /// Passed through to the worker as request parameters
    #[serde(default)]
    pub meta: Map<String, Value>,
}

fn default_modality() -> String {
    Modality::default().to_string()
}

fn default_version() -> String {
    "v2".to_string()
}

fn default_omit() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct InferQuery {
    #[serde(default)]
    pub preloaded: bool,
}

/// Worker selection for load and unload
#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    #[serde(default = "default_modality")]
    pub modality: String,
    pub language: String,
    #[serde(default = "default_version")]
    pub version: String,
}

impl KeyQuery {
    fn key(&self) -> Result<WorkerKey> {
        let modality: Modality = self.modality.parse()?;
        let language: Language = self.language.parse()?;
        Ok(WorkerKey::new(modality, language, self.version.clone()))
    }
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub key: String,
    pub runtime_ref: String,
    pub readiness: Readiness,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UnloadResponse {
    pub key: String,
    pub unloaded: bool,
}

#[derive(Debug, Serialize)]
pub struct LoadedResponse {
    pub loaded: Vec<WorkerKey>,
    pub stats: PoolStats,
}

// ============================================================================
// Router
// ============================================================================

/// Create the OCR router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/infer", post(infer))
        .route("/load", post(load))
        .route("/unload", post(unload))
        .route("/loaded", get(loaded))
        .route("/capabilities", get(capabilities))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /ocr/infer
async fn infer(
    State(state): State<AppState>,
    Query(query): Query<InferQuery>,
    Json(body): Json<InferRequest>,
) -> Result<Json<Vec<OcrResult>>> {
    let modality: Modality = body.modality.parse()?;
    let language: Language = body.language.parse()?;
    let images = decode_images(&body.image_content)?;

    tracing::info!(
        modality = %modality,
        language = %language,
        version = %body.version,
        modelid = ?body.modelid,
        images = images.len(),
        preloaded = query.preloaded,
        "OCR request"
    );

    let mut request = OcrRequest::new(images, modality, language, body.version);
    request.level = body.level;
    request.preloaded = query.preloaded;
    request.omit_meta = body.omit;
    request.params = body.meta;

    let results = state.dispatcher().dispatch(request).await?;
    Ok(Json(results))
}

/// POST /ocr/load
async fn load(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<LoadResponse>> {
    let key = query.key()?;
    state
        .registry()
        .validate(key.modality, key.language, &key.version)?;

    let handle = state.pool().ensure_loaded(&key).await?;
    Ok(Json(LoadResponse {
        key: key.to_string(),
        runtime_ref: handle.runtime_ref.clone(),
        readiness: handle.readiness,
        started_at: handle.started_at,
    }))
}

/// POST /ocr/unload
async fn unload(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<UnloadResponse>> {
    let key = query.key()?;
    let unloaded = state.pool().evict(&key).await;
    Ok(Json(UnloadResponse {
        key: key.to_string(),
        unloaded,
    }))
}

/// GET /ocr/loaded
async fn loaded(State(state): State<AppState>) -> Result<Json<LoadedResponse>> {
    let loaded = state.pool().list_loaded().await?;
    Ok(Json(LoadedResponse {
        loaded: loaded.into_iter().collect(),
        stats: state.pool().stats(),
    }))
}

/// GET /ocr/capabilities
async fn capabilities(State(state): State<AppState>) -> Json<Vec<CapabilityRule>> {
    Json(state.registry().rules().to_vec())
}

/// Decode base64 payloads, failing on the first missing or malformed image
fn decode_images(content: &[Option<String>]) -> Result<Vec<Vec<u8>>> {
    content
        .iter()
        .enumerate()
        .map(|(index, encoded)| {
            let encoded = encoded
                .as_deref()
                .ok_or(GatewayError::ImageTransferError(index))?;
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| GatewayError::ImageTransferError(index))
        })
        .collect()
}
