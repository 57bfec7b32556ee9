use sea_orm::sea_query::LockType;
use sea_orm::{Condition, EntityTrait, QuerySelect, TransactionTrait};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderWithItems},
    entity::Orders,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::OrderStatus,
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service::{order_with_items, paged_orders, parse_status, set_status},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (list, meta) = paged_orders(&state.orm, Condition::all(), query).await?;
    Ok(ApiResponse::success("Orders", list, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let data = order_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", data, Some(Meta::empty())))
}

/// Move an order along the fulfilment chain; illegal jumps are rejected.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    next: OrderStatus,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = parse_status(&order.status)?;
    if !current.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "Cannot move order from {current} to {next}"
        )));
    }

    let order = set_status(&txn, order, next).await?;
    txn.commit().await?;

    tracing::info!(order_id = %order.id, from = %current, to = %next, admin = %user.user_id, "order status updated");
    let data = order_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("Order status updated", data, Some(Meta::empty())))
}
