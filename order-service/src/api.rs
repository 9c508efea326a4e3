use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use shared::*;
use uuid::Uuid;

use crate::lifecycle::OrderLifecycleManager;
use crate::repository::OrderFilter;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: OrderLifecycleManager,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusParams {
    pub payment_status: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn error_response(e: ServiceError) -> ApiError {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!("Order request failed: {}", e);
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
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/statistics", get(order_statistics))
        .route("/api/orders/user/:user_id", get(list_orders_by_user))
        .route("/api/orders/status/:status", get(list_orders_by_status))
        .route(
            "/api/orders/user/:user_id/status/:status",
            get(list_orders_by_user_and_status),
        )
        .route("/api/orders/:id", get(get_order).delete(cancel_order))
        .route("/api/orders/:id/status", put(update_status))
        .route("/api/orders/:id/payment-status", put(update_payment_status))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = state
        .lifecycle
        .create_order(request)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    state
        .lifecycle
        .get_order(id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn list(
    state: &AppState,
    filter: OrderFilter,
    page: PageRequest,
) -> ApiResult<Json<Page<Order>>> {
    state
        .lifecycle
        .list_orders(filter, page)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Order>>> {
    list(&state, OrderFilter::default(), page).await
}

pub async fn list_orders_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Order>>> {
    let filter = OrderFilter {
        user_id: Some(user_id),
        status: None,
    };
    list(&state, filter, page).await
}

pub async fn list_orders_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Order>>> {
    let status = status.parse::<OrderStatus>().map_err(error_response)?;
    let filter = OrderFilter {
        user_id: None,
        status: Some(status),
    };
    list(&state, filter, page).await
}

pub async fn list_orders_by_user_and_status(
    State(state): State<AppState>,
    Path((user_id, status)): Path<(i64, String)>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Page<Order>>> {
    let status = status.parse::<OrderStatus>().map_err(error_response)?;
    let filter = OrderFilter {
        user_id: Some(user_id),
        status: Some(status),
    };
    list(&state, filter, page).await
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<StatusParams>,
) -> ApiResult<Json<Order>> {
    let status = params.status.parse::<OrderStatus>().map_err(error_response)?;
    state
        .lifecycle
        .set_status(id, status)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PaymentStatusParams>,
) -> ApiResult<Json<Order>> {
    let payment_status = params
        .payment_status
        .parse::<PaymentStatus>()
        .map_err(error_response)?;
    state
        .lifecycle
        .set_payment_status(id, payment_status)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .lifecycle
        .cancel_order(id)
        .await
        .map_err(error_response)?;
    Ok(Json(MessageResponse::new("Order cancelled successfully")))
}

pub async fn order_statistics(State(state): State<AppState>) -> ApiResult<Json<OrderStatistics>> {
    state
        .lifecycle
        .statistics()
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn health_check() -> &'static str {
    "OK"
}
