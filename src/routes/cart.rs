use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartCount, CartView, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::guest::{CartSession, ExistingCartOwner, GuestCookie},
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

/// A freshly minted guest cookie rides on errors too, so the new session is
/// never stranded.
type CartReply<T> = (Option<GuestCookie>, AppResult<Json<ApiResponse<T>>>);

fn reply<T>(session: CartSession, result: AppResult<ApiResponse<T>>) -> CartReply<T> {
    (session.cookie, result.map(Json))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/count", get(cart_count))
        .route("/items", axum::routing::post(add_to_cart))
        .route("/items/{id}", patch(update_item).delete(remove_item))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Cart of the signed-in user or guest session", body = ApiResponse<CartView>)
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(State(state): State<AppState>, session: CartSession) -> CartReply<CartView> {
    let result = cart_service::get_cart(&state, &session.owner).await;
    reply(session, result)
}

#[utoipa::path(
    get,
    path = "/api/cart/count",
    responses(
        (status = 200, description = "Total quantity in the cart; zero without a session, which is never minted here", body = ApiResponse<CartCount>)
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn cart_count(
    State(state): State<AppState>,
    ExistingCartOwner(owner): ExistingCartOwner,
) -> AppResult<Json<ApiResponse<CartCount>>> {
    let resp = match owner {
        Some(owner) => cart_service::cart_count(&state, &owner).await?,
        None => ApiResponse::success("Cart count", CartCount { count: 0 }, None),
    };
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added; an existing line for the variant is incremented", body = ApiResponse<CartView>),
        (status = 404, description = "Product or variant not found"),
        (status = 422, description = "Invalid quantity"),
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    session: CartSession,
    payload: Result<Json<AddToCartRequest>, JsonRejection>,
) -> CartReply<CartView> {
    let result = match body(payload) {
        Ok(payload) => cart_service::add_to_cart(&state, &session.owner, payload).await,
        Err(err) => Err(err),
    };
    reply(session, result)
}

#[utoipa::path(
    patch,
    path = "/api/cart/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart item ID")
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity set; zero or less removes the line", body = ApiResponse<CartView>),
        (status = 404, description = "Cart item not found"),
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: CartSession,
    payload: Result<Json<UpdateCartItemRequest>, JsonRejection>,
) -> CartReply<CartView> {
    let result = match body(payload) {
        Ok(payload) => {
            cart_service::update_quantity(&state, &session.owner, id, payload.quantity).await
        }
        Err(err) => Err(err),
    };
    reply(session, result)
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "OK", body = ApiResponse<CartView>),
        (status = 404, description = "Cart item not found"),
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: CartSession,
) -> CartReply<CartView> {
    let result = cart_service::remove_from_cart(&state, &session.owner, id).await;
    reply(session, result)
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "All lines removed", body = ApiResponse<CartView>),
    ),
    security((), ("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(State(state): State<AppState>, session: CartSession) -> CartReply<CartView> {
    let result = cart_service::clear_cart(&state, &session.owner).await;
    reply(session, result)
}
