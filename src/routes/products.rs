use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::products::ProductList,
    error::AppResult,
    models::ProductDetail,
    response::ApiResponse,
    routes::params::ProductFilters,
    services::catalog_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("search" = Option<String>, Query, description = "Case-insensitive match on name or description"),
        ("gender" = Option<Vec<String>>, Query, description = "Gender slugs, repeatable (`gender=men&gender[]=women`)"),
        ("brand" = Option<Vec<String>>, Query, description = "Brand slugs, repeatable"),
        ("category" = Option<Vec<String>>, Query, description = "Category slugs, repeatable"),
        ("color" = Option<Vec<String>>, Query, description = "Color slugs, repeatable"),
        ("size" = Option<Vec<String>>, Query, description = "Size slugs, repeatable"),
        ("price" = Option<Vec<String>>, Query, description = "Price range tokens in dollars: `25-50`, `150+`"),
        ("priceMin" = Option<f64>, Query, description = "Lower price bound in dollars"),
        ("priceMax" = Option<f64>, Query, description = "Upper price bound in dollars"),
        ("sort" = Option<String>, Query, description = "featured, newest, price_asc, price_desc (aliases: latest, price-low, price-high)"),
        ("sortBy" = Option<String>, Query, description = "Fallback for `sort`"),
        ("page" = Option<u64>, Query, description = "Page number, default 1"),
        ("limit" = Option<u64>, Query, description = "Page size, default 20, max 100")
    ),
    responses(
        (status = 200, description = "Published products matching the filters", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let filters = ProductFilters::from_query(query.as_deref().unwrap_or_default());
    let resp = catalog_service::list_products(&state, &filters).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product detail", body = ApiResponse<ProductDetail>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let resp = catalog_service::get_product(&state, id).await?;
    Ok(Json(resp))
}
