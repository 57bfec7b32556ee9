use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    dto::favorites::{FavoriteList, FavoriteStatus},
    entity::{
        Products, Wishlists,
        products::Column as ProductCol,
        wishlists::{ActiveModel as WishlistActive, Column as WishlistCol},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::FavoriteProduct,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::catalog_service::summarize,
    state::AppState,
};

/// Flip membership of `(user, product)` in the wishlist.
pub async fn toggle_favorite(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<FavoriteStatus>> {
    Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let condition = Condition::all()
        .add(WishlistCol::UserId.eq(user.user_id))
        .add(WishlistCol::ProductId.eq(product_id));

    let removed = Wishlists::delete_many()
        .filter(condition)
        .exec(&state.orm)
        .await?;

    let is_favorite = if removed.rows_affected > 0 {
        false
    } else {
        WishlistActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            product_id: Set(product_id),
            added_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await?;
        true
    };

    let message = if is_favorite {
        "Added to favorites"
    } else {
        "Removed from favorites"
    };
    Ok(ApiResponse::success(
        message,
        FavoriteStatus {
            product_id,
            is_favorite,
        },
        None,
    ))
}

pub async fn is_favorite(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<FavoriteStatus>> {
    let count = Wishlists::find()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .filter(WishlistCol::ProductId.eq(product_id))
        .count(&state.orm)
        .await?;
    Ok(ApiResponse::success(
        "OK",
        FavoriteStatus {
            product_id,
            is_favorite: count > 0,
        },
        None,
    ))
}

pub async fn list_favorites(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<FavoriteList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Wishlists::find()
        .filter(WishlistCol::UserId.eq(user.user_id))
        .order_by_desc(WishlistCol::AddedAt)
        .order_by_asc(WishlistCol::Id);

    let total = finder.clone().count(&state.orm).await? as i64;
    let rows = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let products = Products::find()
        .filter(ProductCol::Id.is_in(rows.iter().map(|r| r.product_id)))
        .all(&state.orm)
        .await?;
    let mut summaries: HashMap<Uuid, _> = summarize(&state.orm, products, None)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let items = rows
        .into_iter()
        .filter_map(|row| {
            summaries.remove(&row.product_id).map(|product| FavoriteProduct {
                id: row.id,
                product,
                added_at: row.added_at.with_timezone(&Utc),
            })
        })
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("OK", FavoriteList { items }, Some(meta)))
}
