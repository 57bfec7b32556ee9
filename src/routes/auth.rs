use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest},
    error::AppResult,
    middleware::guest::{GuestCookie, GuestToken},
    response::ApiResponse,
    services::auth_service::{login_user, register_user},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register user; a guest cart is carried over", body = ApiResponse<LoginResponse>),
        (status = 422, description = "Field validation errors")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    GuestToken(guest): GuestToken,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Option<GuestCookie>, Json<ApiResponse<LoginResponse>>)> {
    let resp = register_user(&state, payload, guest.as_deref()).await?;
    let cookie = settled_guest_cookie(guest.as_deref(), &resp);
    Ok((StatusCode::CREATED, cookie, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login user; a guest cart is carried over", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    GuestToken(guest): GuestToken,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(Option<GuestCookie>, Json<ApiResponse<LoginResponse>>)> {
    let resp = login_user(&state, payload, guest.as_deref()).await?;
    let cookie = settled_guest_cookie(guest.as_deref(), &resp);
    Ok((cookie, Json(resp)))
}

/// Clears the guest cookie once its cart has been carried over. After a failed
/// merge the cookie stays so the guest cart remains reachable.
fn settled_guest_cookie(
    guest: Option<&str>,
    resp: &ApiResponse<LoginResponse>,
) -> Option<GuestCookie> {
    let merged = resp.data.as_ref().and_then(|data| data.merged_cart_items);
    (guest.is_some() && merged.is_some()).then(GuestCookie::clear)
}
