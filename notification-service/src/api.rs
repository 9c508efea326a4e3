use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use shared::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::reminders::ReminderService;
use crate::repository::ReminderFilter;
use crate::scheduler::{DispatchSummary, ReminderScheduler};

#[derive(Clone)]
pub struct AppState {
    pub reminders: ReminderService,
    pub scheduler: Arc<ReminderScheduler>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn error_response(e: ServiceError) -> ApiError {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!("Reminder request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/reminders", get(list_reminders).post(create_reminder))
        .route("/api/reminders/statistics", get(reminder_statistics))
        .route("/api/reminders/process", post(process_reminders))
        .route("/api/reminders/user/:user_id", get(list_reminders_by_user))
        .route(
            "/api/reminders/user/:user_id/active",
            get(list_active_reminders_by_user),
        )
        .route(
            "/api/reminders/:id",
            get(get_reminder).put(update_reminder).delete(delete_reminder),
        )
        .route("/api/reminders/:id/activate", put(activate_reminder))
        .route("/api/reminders/:id/deactivate", put(deactivate_reminder))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_reminder(
    State(state): State<AppState>,
    Json(request): Json<ReminderRequest>,
) -> ApiResult<(StatusCode, Json<Reminder>)> {
    let reminder = state
        .reminders
        .create_reminder(request)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

pub async fn get_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Reminder>> {
    state
        .reminders
        .get_reminder(id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list(
    state: &AppState,
    filter: ReminderFilter,
    page: PageRequest,
) -> ApiResult<Json<Page<Reminder>>> {
    state
        .reminders
        .list_reminders(filter, page)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_reminders(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Reminder>>> {
    list(&state, ReminderFilter::default(), page).await
}

pub async fn list_reminders_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Reminder>>> {
    let filter = ReminderFilter {
        user_id: Some(user_id),
        active: None,
    };
    list(&state, filter, page).await
}

pub async fn list_active_reminders_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Reminder>>> {
    let filter = ReminderFilter {
        user_id: Some(user_id),
        active: Some(true),
    };
    list(&state, filter, page).await
}

pub async fn update_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReminderRequest>,
) -> ApiResult<Json<Reminder>> {
    state
        .reminders
        .update_reminder(id, request)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .reminders
        .delete_reminder(id)
        .await
        .map_err(error_response)?;
    Ok(Json(MessageResponse::new("Reminder deleted successfully")))
}

pub async fn activate_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .reminders
        .activate_reminder(id)
        .await
        .map_err(error_response)?;
    Ok(Json(MessageResponse::new("Reminder activated successfully")))
}

pub async fn deactivate_reminder(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .reminders
        .deactivate_reminder(id)
        .await
        .map_err(error_response)?;
    Ok(Json(MessageResponse::new("Reminder deactivated successfully")))
}

pub async fn reminder_statistics(
    State(state): State<AppState>,
) -> ApiResult<Json<ReminderStatistics>> {
    state
        .scheduler
        .statistics()
        .await
        .map(Json)
        .map_err(error_response)
}

/// Runs the same matching the periodic tick does, for the current minute.
pub async fn process_reminders(
    State(state): State<AppState>,
) -> ApiResult<Json<DispatchSummary>> {
    state
        .scheduler
        .process_due_reminders()
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn health_check() -> &'static str {
    "OK"
}
