use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::FavoriteProduct;

#[derive(Debug, Serialize, ToSchema)]
pub struct FavoriteStatus {
    pub product_id: Uuid,
    pub is_favorite: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct FavoriteList {
    #[schema(value_type = Vec<FavoriteProduct>)]
    pub items: Vec<FavoriteProduct>,
}
