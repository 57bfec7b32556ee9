use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{BrandRef, CategoryRef, ColorRef, GenderRef, ProductSummary, SizeRef};

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub products: Vec<ProductSummary>,
    pub total_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryOption {
    #[serde(flatten)]
    pub category: CategoryRef,
    pub parent_id: Option<uuid::Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FilterOptions {
    pub genders: Vec<GenderRef>,
    pub brands: Vec<BrandRef>,
    pub categories: Vec<CategoryOption>,
    pub colors: Vec<ColorRef>,
    pub sizes: Vec<SizeRef>,
}
