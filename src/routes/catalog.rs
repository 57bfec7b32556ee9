use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::products::FilterOptions, error::AppResult, response::ApiResponse,
    services::catalog_service, state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/filters", get(filter_options))
}

#[utoipa::path(
    get,
    path = "/api/catalog/filters",
    responses(
        (status = 200, description = "Genders, brands, categories, colors and sizes", body = ApiResponse<FilterOptions>)
    ),
    tag = "Catalog"
)]
pub async fn filter_options(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<FilterOptions>>> {
    let resp = catalog_service::list_filter_options(&state).await?;
    Ok(Json(resp))
}
