use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header::InvalidHeaderValue, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use hazup_store::{FileStore, UploadRecord};
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub store: FileStore,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/upload", post(upload))
        .route("/update-logs", get(update_logs))
        // Payload size limits are out of scope; oversized files are written
        // as-is.
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// CORS policy for a single development frontend origin. Credentials are
/// allowed, so tower-http requires mirrored methods/headers instead of
/// wildcards.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    let origin: HeaderValue = origin.parse()?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let mut file: Option<(String, Bytes)> = None;
    let mut category: Option<String> = None;
    let mut username: Option<String> = None;
    let mut user_id: Option<String> = None;

    // Drain every part before touching the filesystem so a missing field
    // leaves no side effects.
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some((file_name, bytes));
            }
            "type" => category = Some(field.text().await.map_err(bad_multipart)?),
            "username" => username = Some(field.text().await.map_err(bad_multipart)?),
            "user_id" => user_id = Some(field.text().await.map_err(bad_multipart)?),
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| missing_field("file"))?;
    let category = category.ok_or_else(|| missing_field("type"))?;
    let username = username.ok_or_else(|| missing_field("username"))?;
    let user_id = user_id.ok_or_else(|| missing_field("user_id"))?;

    let dest_name = state
        .store
        .store_upload(&category, &file_name, &bytes)
        .await
        .map_err(|e| internal_error(e.into()))?;

    let record = UploadRecord::new(&username, &user_id, &file_name, &category);
    state
        .store
        .append_record(&record)
        .await
        .map_err(|e| internal_error(e.into()))?;

    info!(file = %file_name, dest = %dest_name, category = %category, "upload stored");
    Ok(Json(json!({
        "message": format!("File {file_name} uploaded successfully as {dest_name}")
    })))
}

async fn update_logs(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let logs = state
        .store
        .read_log()
        .await
        .map_err(|e| internal_error(e.into()))?;
    Ok(Json(json!({ "logs": logs })))
}

fn missing_field(field: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": "missing_field", "field": field })),
    )
}

fn bad_multipart(error: MultipartError) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "malformed_multipart", "detail": error.to_string() })),
    )
}

fn internal_error(error: anyhow::Error) -> (StatusCode, Json<Value>) {
    error!(error = %error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "detail": error.to_string() })),
    )
}
