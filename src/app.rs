#![cfg(feature = "web")]

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::editor::TableEditor;
use crate::error::ViewError;
use crate::record::RowId;
use crate::validation::validate_field;

pub struct AppState {
    pub editor: Mutex<TableEditor>,
}

#[derive(Deserialize)]
struct SearchUpdate {
    text: String,
}

#[derive(Deserialize)]
struct FilterUpdate {
    column: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct SortUpdate {
    column: Option<String>,
}

#[derive(Deserialize)]
struct ColumnToggle {
    column: String,
}

#[derive(Deserialize)]
struct ScrollUpdate {
    scroll_top: f64,
    scroll_height: f64,
    client_height: f64,
}

#[derive(Deserialize)]
struct CellUpdate {
    column: String,
    value: String,
}

#[derive(Deserialize)]
struct EditStart {
    row: String,
    column: String,
}

#[derive(Deserialize)]
struct DraftUpdate {
    text: String,
}

#[derive(Deserialize)]
struct ValidateQuery {
    field: String,
    value: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

impl StatusResponse {
    fn error(message: impl Into<String>) -> Self {
        StatusResponse {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

fn view_error(e: ViewError) -> Response {
    let code = match e {
        ViewError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        ViewError::Fetch(_) => StatusCode::BAD_GATEWAY,
    };
    (code, Json(StatusResponse::error(e.to_string()))).into_response()
}

fn invalid(message: String) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(StatusResponse::error(message)),
    )
        .into_response()
}

/// Builds the HTTP API around an editor.
pub fn router(state: Arc<AppState>, static_dir: &str) -> Router {
    Router::new()
        .route("/api/grid", get(get_grid))
        .route("/api/start", post(start))
        .route("/api/search", post(set_search))
        .route("/api/filter", post(set_filter))
        .route("/api/sort", post(set_sort))
        .route("/api/columns/toggle", post(toggle_column))
        .route("/api/scroll", post(scroll))
        .route("/api/load_more", post(load_more))
        .route("/api/rows", post(add_row))
        .route("/api/rows/:id", axum::routing::patch(update_row).delete(delete_row))
        .route("/api/edit/start", post(start_edit))
        .route("/api/edit/draft", post(set_draft))
        .route("/api/edit/commit", post(commit_edit))
        .route("/api/edit/cancel", post(cancel_edit))
        .route("/api/validate", post(validate))
        .route("/api/export/csv", get(export_csv))
        .route("/api/export/xlsx", get(export_xlsx))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

pub async fn run(
    editor: TableEditor,
    port: u16,
    static_dir: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let app_state = Arc::new(AppState {
        editor: Mutex::new(editor),
    });

    let app = router(app_state.clone(), static_dir);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening on http://127.0.0.1:{}", port);

    // The grid answers with `loading: true` until this finishes. A failed
    // first load leaves the grid in its error state; POST /api/start retries.
    let loading_state = app_state.clone();
    tokio::spawn(async move {
        if let Err(e) = TableEditor::start_shared(&loading_state.editor).await {
            error!("Initial dataset load failed: {}", e);
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c, serving until killed: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    app_state.editor.lock().await.shutdown().await;
    Ok(())
}

async fn get_grid(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let editor = state.editor.lock().await;
    Json(editor.render())
}

async fn start(State(state): State<Arc<AppState>>) -> Response {
    match TableEditor::start_shared(&state.editor).await {
        Ok(()) => Json(state.editor.lock().await.render()).into_response(),
        Err(e) => view_error(e),
    }
}

async fn set_search(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SearchUpdate>,
) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    editor.set_search(&payload.text);
    Json(editor.render())
}

async fn set_filter(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FilterUpdate>,
) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    match (payload.column, payload.value) {
        (None, _) => editor.clear_filter(),
        (Some(column), None) => editor.choose_filter_column(&column),
        (Some(column), Some(value)) => {
            if editor.view().params().filter_column.as_deref() != Some(column.as_str()) {
                editor.choose_filter_column(&column);
            }
            editor.set_filter_value(&value);
        }
    }
    Json(editor.render())
}

async fn set_sort(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SortUpdate>,
) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    match payload.column {
        Some(column) => editor.choose_sort_column(&column),
        None => editor.clear_sort(),
    }
    Json(editor.render())
}

async fn toggle_column(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ColumnToggle>,
) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    editor.toggle_column(&payload.column);
    Json(editor.render())
}

async fn scroll(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ScrollUpdate>,
) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    editor.on_scroll(
        payload.scroll_top,
        payload.scroll_height,
        payload.client_height,
    );
    Json(editor.render())
}

async fn load_more(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    editor.load_more();
    Json(editor.render())
}

async fn add_row(State(state): State<Arc<AppState>>) -> Response {
    let mut editor = state.editor.lock().await;
    match editor.add_row().await {
        Ok(_) => (StatusCode::CREATED, Json(editor.render())).into_response(),
        Err(e) => view_error(e),
    }
}

async fn update_row(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CellUpdate>,
) -> Response {
    let mut editor = state.editor.lock().await;
    let row = RowId::from(id);
    match editor
        .update_cell(&row, &payload.column, &payload.value)
        .await
    {
        Ok(None) => Json(editor.render()).into_response(),
        Ok(Some(message)) => invalid(message),
        Err(e) => view_error(e),
    }
}

async fn delete_row(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let mut editor = state.editor.lock().await;
    match editor.delete_row(&RowId::from(id)).await {
        Ok(()) => Json(editor.render()).into_response(),
        Err(e) => view_error(e),
    }
}

async fn start_edit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EditStart>,
) -> Response {
    let mut editor = state.editor.lock().await;
    if editor.start_edit(&RowId::from(payload.row), &payload.column) {
        Json(editor.render()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn set_draft(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DraftUpdate>,
) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    editor.set_draft(&payload.text);
    Json(editor.render())
}

async fn commit_edit(State(state): State<Arc<AppState>>) -> Response {
    let mut editor = state.editor.lock().await;
    match editor.commit_edit().await {
        Ok(None) => Json(editor.render()).into_response(),
        Ok(Some(message)) => invalid(message),
        Err(e) => view_error(e),
    }
}

async fn cancel_edit(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut editor = state.editor.lock().await;
    editor.cancel_edit();
    Json(editor.render())
}

async fn validate(Json(payload): Json<ValidateQuery>) -> impl IntoResponse {
    Json(validate_field(&payload.field, &payload.value))
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    let editor = state.editor.lock().await;
    match editor.export_csv() {
        Ok(csv) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/csv")
            .header(header::CONTENT_DISPOSITION, "attachment; filename=\"table.csv\"")
            .body(axum::body::Body::from(csv))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusResponse::error(e.to_string())),
        )
            .into_response(),
    }
}

async fn export_xlsx(State(state): State<Arc<AppState>>) -> Response {
    let editor = state.editor.lock().await;
    match editor.export_xlsx() {
        Ok(buffer) => Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            )
            .header(header::CONTENT_DISPOSITION, "attachment; filename=\"table.xlsx\"")
            .body(axum::body::Body::from(Bytes::from(buffer)))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusResponse::error(e.to_string())),
        )
            .into_response(),
    }
}
