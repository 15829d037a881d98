//! HTTP surface of the converter service.

use crate::{
    config::{Config, Toolchains},
    convert::{self, ConversionJob, ConvertError, ProcessRunner, StageRunner},
    models,
    util::ensure_dir,
};
use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub upload_dir: PathBuf,
    pub toolchains: Toolchains,
    pub runner: Arc<dyn StageRunner>,
}

impl AppState {
    pub fn new(cfg: &Config) -> Self {
        Self {
            upload_dir: PathBuf::from(&cfg.server.upload_dir),
            toolchains: cfg.toolchains.clone(),
            runner: Arc::new(ProcessRunner::new(cfg.toolchains.timeout_seconds)),
        }
    }
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ConvertError::NoFile | ConvertError::Multipart(_) => {
                warn!("rejected upload: {self}");
                (StatusCode::BAD_REQUEST, "No file provided".to_string())
            }
            ConvertError::MultipleFiles => {
                warn!("rejected upload: {self}");
                (StatusCode::BAD_REQUEST, "Multiple files provided".to_string())
            }
            ConvertError::TooLarge(_) => {
                warn!("rejected upload: {self}");
                (StatusCode::PAYLOAD_TOO_LARGE, "File too large".to_string())
            }
            ConvertError::UnsupportedType(_) => {
                warn!("rejected upload: {self}");
                (StatusCode::BAD_REQUEST, "Unsupported file type".to_string())
            }
            ConvertError::Persist { source, .. } => {
                error!("{self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to save upload: {source}"),
                )
            }
            ConvertError::Tool(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Conversion failed: {err}"),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/convert", post(convert_upload))
        .route("/api/models", get(list_models))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(cfg: &Config) -> Result<()> {
    let state = AppState::new(cfg);
    ensure_dir(&state.upload_dir)?;

    let app = build_router(state, cfg.server.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!(
        "listening on {} upload_dir={}",
        cfg.server.bind, cfg.server.upload_dir
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| "serving HTTP")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("ctrl_c handler failed: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

struct Upload {
    file_name: String,
    data: Bytes,
}

fn multipart_error(err: MultipartError) -> ConvertError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ConvertError::TooLarge(err.body_text())
    } else {
        ConvertError::Multipart(err.body_text())
    }
}

/// Reads the single `file` field. Other fields are skipped.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ConvertError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        if upload.is_some() {
            return Err(ConvertError::MultipleFiles);
        }
        let file_name = field.file_name().map(String::from);
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, data));
    }

    match upload {
        Some((Some(file_name), data)) if !file_name.is_empty() => Ok(Upload { file_name, data }),
        _ => Err(ConvertError::NoFile),
    }
}

/// POST /convert
async fn convert_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ConvertError> {
    let multipart = multipart.map_err(|e| ConvertError::Multipart(e.body_text()))?;
    let upload = read_upload(multipart).await?;
    debug!("received {} ({} bytes)", upload.file_name, upload.data.len());

    let job = ConversionJob::plan(&state.upload_dir, &upload.file_name, &state.toolchains)?;
    debug!(format = ?job.format, "validated {}", upload.file_name);

    let persist_err = |source: std::io::Error| ConvertError::Persist {
        path: job.input.clone(),
        source,
    };
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(persist_err)?;
    tokio::fs::write(&job.input, &upload.data)
        .await
        .map_err(persist_err)?;
    info!("persisted {}", job.input.display());

    convert::toolchain::run_job(state.runner.as_ref(), &job).await?;
    info!("converted {} -> {}", job.input.display(), job.output.display());

    Ok(Json(json!({
        "message": format!("File converted successfully to {}", job.output.display())
    })))
}

/// GET /api/models
async fn list_models(State(state): State<AppState>) -> Response {
    match models::list_models(&state.upload_dir).await {
        Ok(list) => Json(list).into_response(),
        Err(err) => {
            error!("reading {}: {err}", state.upload_dir.display());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Server error while reading files" })),
            )
                .into_response()
        }
    }
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
