use crate::config::{ResponseMode, ServerConfig};
use crate::storage::{download_url, OutputStorage, OUTPUT_FILE_NAME};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Json, Multipart, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use image2pdf::{ConvertError, ConvertOptions, Converter, Stage, Upload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Detail returned for every internal fault; the cause is only logged.
pub const INTERNAL_ERROR_DETAIL: &str = "Failed to convert images. Please try again later.";

/// Header carrying the identifier of the request's output.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message describing what went wrong
    pub detail: String,
}

/// Body of a successful conversion in link mode
#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub download_url: String,
}

/// Application-specific error types for the API
#[derive(Debug)]
pub enum AppError {
    /// Conversion pipeline errors; the client's fault or an internal one
    Convert(ConvertError),
    /// The multipart body could not be read
    Multipart(String),
    /// The request body exceeded the configured limit
    PayloadTooLarge(String),
    /// Writing or reading the output failed
    Storage(std::io::Error),
    /// Anything else that should never reach the client verbatim
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Convert(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Convert(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            AppError::Convert(e) if e.is_client_error() => e.to_string(),
            AppError::Convert(e) => {
                error!(stage = %e.stage(), "conversion failed: {e}");
                INTERNAL_ERROR_DETAIL.to_string()
            }
            AppError::Multipart(msg) => {
                warn!("rejected malformed upload: {msg}");
                format!("Invalid upload: {msg}")
            }
            AppError::PayloadTooLarge(msg) => {
                warn!("rejected oversized upload: {msg}");
                msg
            }
            AppError::Storage(e) => {
                error!(stage = %Stage::Persisted, "storage failure: {e}");
                INTERNAL_ERROR_DETAIL.to_string()
            }
            AppError::Internal(msg) => {
                error!("internal error: {msg}");
                INTERNAL_ERROR_DETAIL.to_string()
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<ConvertError> for AppError {
    fn from(err: ConvertError) -> Self {
        AppError::Convert(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(err.body_text())
        } else {
            AppError::Multipart(err.body_text())
        }
    }
}

/// Shared, read-only state of the service
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub converter: Converter,
    pub storage: OutputStorage,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let converter = Converter::new(ConvertOptions::new().with_background(config.background));
        let storage = OutputStorage::new(config.output_dir.clone());
        Self {
            config: Arc::new(config),
            converter,
            storage,
        }
    }
}

/// Build the application router with all routes configured
pub fn app(config: ServerConfig) -> Router {
    let state = AppState::new(config);
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/convert/", post(convert_images))
        .route("/convert", post(convert_images))
        .route("/api/health", get(health_check))
        .route_service("/", ServeFile::new(config.static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(&config.static_dir));

    if config.response_mode == ResponseMode::Link {
        router = router.nest_service("/outputs", ServeDir::new(&config.output_dir));
    }

    router
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancing
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "image2pdf API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Convert the uploaded images, in order, into a single PDF
pub async fn convert_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4();
    let uploads = read_uploads(&mut multipart).await?;
    info!(%request_id, files = uploads.len(), "conversion requested");

    let converter = state.converter.clone();
    let document = tokio::task::spawn_blocking(move || converter.convert(&uploads))
        .await
        .map_err(|e| AppError::Internal(format!("conversion task did not complete: {e}")))??;

    let page_count = document.page_count();
    let storage = state.storage.clone();
    let mode = state.config.response_mode;
    let bytes = tokio::task::spawn_blocking(move || -> std::io::Result<Option<Vec<u8>>> {
        storage.persist(request_id, document.as_bytes())?;
        match mode {
            ResponseMode::Link => Ok(None),
            ResponseMode::Binary => storage.take(request_id).map(Some),
        }
    })
    .await
    .map_err(|e| AppError::Internal(format!("storage task did not complete: {e}")))??;

    info!(%request_id, pages = page_count, stage = %Stage::Persisted, "conversion complete");

    match bytes {
        Some(bytes) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{OUTPUT_FILE_NAME}\""),
                ),
                (
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    request_id.to_string(),
                ),
            ],
            bytes,
        )
            .into_response()),
        None => Ok((
            StatusCode::OK,
            Json(ConvertResponse {
                download_url: download_url(request_id),
            }),
        )
            .into_response()),
    }
}

/// Collect every `files` / `files[]` part in arrival order.
async fn read_uploads(multipart: &mut Multipart) -> Result<Vec<Upload>, AppError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name != "files" && field_name != "files[]" {
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let data = field.bytes().await?;

        // A browser sends an empty part when no file was chosen
        if filename.is_empty() && data.is_empty() {
            continue;
        }
        uploads.push(Upload::new(filename, data.to_vec()));
    }

    Ok(uploads)
}
