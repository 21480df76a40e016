//! HTTP API: alert CRUD and the debug status view.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::model::{Alert, AlertPatch, NewAlert};
use crate::status::{AlertCounts, DebugStatus, STATUS_FILE, load_status};
use crate::store::{AlertStore, StoreError};

pub struct AppState {
    pub store: Arc<dyn AlertStore>,
    pub data_dir: PathBuf,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Alert not found".to_string()),
            ApiError::Internal(msg) => {
                tracing::error!("api error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Invalid(invalid) => ApiError::BadRequest(invalid.to_string()),
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Ids that do not parse cannot name an alert.
fn parse_id(raw: &str) -> Result<Ulid, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/alerts", get(list_alerts).post(create_alert))
        .route(
            "/api/alerts/{id}",
            axum::routing::put(update_alert)
                .patch(update_alert)
                .delete(delete_alert),
        )
        .route("/api/debug/status", get(debug_status))
        .with_state(state)
}

/// Serve until `shutdown` fires, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("api listening on http://{addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn list_alerts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Alert>>, ApiError> {
    Ok(Json(state.store.list_all().await?))
}

async fn create_alert(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewAlert>, JsonRejection>,
) -> Result<(StatusCode, Json<Alert>), ApiError> {
    let Json(new) = body?;
    let alert = state.store.create(new).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

async fn update_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<AlertPatch>, JsonRejection>,
) -> Result<Json<Alert>, ApiError> {
    let id = parse_id(&id)?;
    let Json(patch) = body?;
    Ok(Json(state.store.update(id, patch).await?))
}

async fn delete_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if state.store.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

async fn debug_status(State(state): State<Arc<AppState>>) -> Json<DebugStatus> {
    let mut status = load_status(&state.data_dir.join(STATUS_FILE)).await;
    let counts = match state.store.list_all().await {
        Ok(alerts) => AlertCounts {
            total: alerts.len(),
            active: alerts.iter().filter(|a| a.active).count(),
        },
        Err(e) => {
            tracing::warn!("could not count alerts: {e}");
            status.alerts
        }
    };
    status.refresh(Utc::now(), counts);
    Json(status)
}
