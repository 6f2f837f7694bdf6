//! HTTP node serving an [`AzureStorage`] backend.
//!
//! Re-exported for the binary and for tests that drive the router directly.

use std::{env, error::Error, io::Cursor, net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use blobstorage_core::{AzureStorage, OpenMode, StorageError, StorageSettings};
use serde::{Deserialize, Serialize};
use tracing::error;

pub type AnyError = Box<dyn Error + Send + Sync>;

/// Request bodies are handed to the block writer in pieces of this size.
const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<AzureStorage>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/blobs/*name",
            get(get_blob)
                .head(head_blob)
                .put(save_blob)
                .post(upload_blob)
                .delete(delete_blob),
        )
        .route("/meta/*name", get(get_meta))
        .route("/urls/*name", get(get_url))
        .with_state(state)
}

/// Runs a blocking storage call off the async executor.
async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AzureStorage) -> Result<T, StorageError> + Send + 'static,
{
    let storage = Arc::clone(&state.storage);
    tokio::task::spawn_blocking(move || op(&storage))
        .await
        .map_err(|err| ApiError::internal(format!("storage task failed: {err}")))?
        .map_err(ApiError::from)
}

async fn get_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    ensure_name_present(&name)?;
    let bytes = blocking(&state, move |storage| {
        storage.open(&name, OpenMode::Read)?.read_content()
    })
    .await?;
    let len = bytes.len();

    let mut response = Response::new(bytes.into());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

async fn head_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    ensure_name_present(&name)?;
    let exists = blocking(&state, move |storage| storage.exists(&name)).await?;
    Ok(if exists {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    })
}

#[derive(Debug, Serialize)]
struct SavedBody {
    name: String,
    size: usize,
}

async fn save_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    ensure_name_present(&name)?;
    let size = body.len();
    let name = blocking(&state, move |storage| {
        storage.save(&name, &mut Cursor::new(body))
    })
    .await?;
    Ok((StatusCode::CREATED, Json(SavedBody { name, size })))
}

async fn upload_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    ensure_name_present(&name)?;
    let size = body.len();
    let saved = name.clone();
    blocking(&state, move |storage| {
        let mut file = storage.open(&name, OpenMode::Write)?;
        for piece in body.chunks(UPLOAD_CHUNK) {
            file.write_content(piece)?;
        }
        file.close()
    })
    .await?;
    Ok((StatusCode::CREATED, Json(SavedBody { name: saved, size })))
}

async fn delete_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_name_present(&name)?;
    blocking(&state, move |storage| storage.delete(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct MetaBody {
    name: String,
    size: u64,
    modified_time: String,
}

async fn get_meta(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MetaBody>, ApiError> {
    ensure_name_present(&name)?;
    let meta = blocking(&state, move |storage| {
        let size = storage.size(&name)?;
        let modified_time = storage.modified_time(&name)?.to_string();
        Ok(MetaBody {
            name,
            size,
            modified_time,
        })
    })
    .await?;
    Ok(Json(meta))
}

#[derive(Debug, Deserialize)]
struct UrlParams {
    expire: Option<u64>,
}

#[derive(Debug, Serialize)]
struct UrlBody {
    url: String,
}

async fn get_url(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<UrlParams>,
) -> Result<Json<UrlBody>, ApiError> {
    ensure_name_present(&name)?;
    let url = blocking(&state, move |storage| storage.url(&name, params.expire)).await?;
    Ok(Json(UrlBody { url }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(value: StorageError) -> Self {
        match &value {
            err if err.is_not_found() => Self::NotFound(value.to_string()),
            StorageError::InvalidMode(_) | StorageError::Unsupported { .. } => {
                Self::bad_request(value.to_string())
            }
            _ => Self::internal(value.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                error!("request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

fn ensure_name_present(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("blob name cannot be empty"));
    }
    Ok(())
}

#[derive(Debug)]
pub struct Settings {
    pub bind_address: SocketAddr,
    pub storage: StorageSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, AnyError> {
        let bind_address = env::var("BLOBSTORAGE_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;
        let storage = StorageSettings::from_env()?;
        Ok(Self {
            bind_address,
            storage,
        })
    }
}
