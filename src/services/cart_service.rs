use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartCount, CartItemRef, CartView},
    entity::{
        CartItems, Carts, Colors, Guests, ProductImages, ProductVariants, Products, Sizes,
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol},
        carts::{ActiveModel as CartActive, Column as CartCol, Model as CartModel},
        colors::Column as ColorCol,
        product_images::{Column as ImageCol, Model as ImageModel},
        product_variants::Column as VariantCol,
        products::Column as ProductCol,
        sizes::Column as SizeCol,
    },
    error::{AppError, AppResult, FieldError},
    middleware::guest::CartOwner,
    models::CartLine,
    response::ApiResponse,
    services::{
        catalog_service::{color_ref, size_ref},
        guest_service,
    },
    state::AppState,
};

fn owner_filter(owner: &CartOwner) -> sea_orm::sea_query::SimpleExpr {
    match owner {
        CartOwner::User(id) => CartCol::UserId.eq(*id),
        CartOwner::Guest(token) => CartCol::GuestId.eq(token.clone()),
    }
}

pub async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> AppResult<Option<CartModel>> {
    Ok(Carts::find().filter(owner_filter(owner)).one(conn).await?)
}

/// Exactly one cart per identity; concurrent first calls converge on the same row.
pub async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    owner: &CartOwner,
) -> AppResult<CartModel> {
    if let Some(cart) = find_cart(conn, owner).await? {
        return Ok(cart);
    }

    let now = Utc::now();
    let (user_id, guest_id, conflict_col) = match owner {
        CartOwner::User(id) => (Some(*id), None, CartCol::UserId),
        CartOwner::Guest(token) => (None, Some(token.clone()), CartCol::GuestId),
    };
    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        guest_id: Set(guest_id),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Carts::insert(cart)
        .on_conflict(OnConflict::column(conflict_col).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;

    find_cart(conn, owner)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("cart vanished after insert")))
}

pub async fn get_cart(state: &AppState, owner: &CartOwner) -> AppResult<ApiResponse<CartView>> {
    let cart = get_or_create_cart(&state.orm, owner).await?;
    let view = cart_view(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("Cart", view, None))
}

pub async fn cart_count(state: &AppState, owner: &CartOwner) -> AppResult<ApiResponse<CartCount>> {
    let count = match find_cart(&state.orm, owner).await? {
        Some(cart) => CartItems::find()
            .select_only()
            .column_as(Expr::col(CartItemCol::Quantity).sum(), "count")
            .filter(CartItemCol::CartId.eq(cart.id))
            .into_tuple::<Option<i64>>()
            .one(&state.orm)
            .await?
            .flatten()
            .unwrap_or(0),
        None => 0,
    };
    Ok(ApiResponse::success("Cart count", CartCount { count }, None))
}

pub async fn add_to_cart(
    state: &AppState,
    owner: &CartOwner,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity < 1 {
        return Err(AppError::Validation(vec![FieldError::new(
            "quantity",
            "quantity must be at least 1",
        )]));
    }

    let variant_id = resolve_variant(&state.orm, payload.item).await?;
    let cart = get_or_create_cart(&state.orm, owner).await?;
    let cart_id = cart.id;
    upsert_item(&state.orm, cart_id, variant_id, payload.quantity).await?;
    touch(&state.orm, cart).await?;

    tracing::debug!(%cart_id, %variant_id, quantity = payload.quantity, "cart item added");
    let view = cart_view(&state.orm, cart_id).await?;
    Ok(ApiResponse::success("Added to cart", view, None))
}

pub async fn update_quantity(
    state: &AppState,
    owner: &CartOwner,
    item_id: Uuid,
    quantity: i32,
) -> AppResult<ApiResponse<CartView>> {
    let cart = find_cart(&state.orm, owner)
        .await?
        .ok_or(AppError::NotFound)?;
    let item = CartItems::find_by_id(item_id)
        .filter(CartItemCol::CartId.eq(cart.id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if quantity <= 0 {
        CartItems::delete_by_id(item.id).exec(&state.orm).await?;
    } else {
        let mut active: CartItemActive = item.into();
        active.quantity = Set(quantity);
        active.update(&state.orm).await?;
    }

    let cart_id = cart.id;
    touch(&state.orm, cart).await?;
    let view = cart_view(&state.orm, cart_id).await?;
    Ok(ApiResponse::success("Cart updated", view, None))
}

pub async fn remove_from_cart(
    state: &AppState,
    owner: &CartOwner,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let cart = find_cart(&state.orm, owner)
        .await?
        .ok_or(AppError::NotFound)?;
    let result = CartItems::delete_many()
        .filter(CartItemCol::Id.eq(item_id))
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    let view = cart_view(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("Removed from cart", view, None))
}

pub async fn clear_cart(state: &AppState, owner: &CartOwner) -> AppResult<ApiResponse<CartView>> {
    let cart = get_or_create_cart(&state.orm, owner).await?;
    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&state.orm)
        .await?;
    let view = cart_view(&state.orm, cart.id).await?;
    Ok(ApiResponse::success("Cart cleared", view, None))
}

/// Move a guest's cart onto a user account and drop the guest session.
///
/// When the user has no cart the guest cart is re-owned in place; otherwise
/// its lines are folded into the user's cart, summing quantities. Returns the
/// number of guest lines carried over. An unknown or expired session carries
/// nothing; an expired one is deleted along with its cart.
pub async fn merge_guest_cart(state: &AppState, token: &str, user_id: Uuid) -> AppResult<u64> {
    let txn = state.orm.begin().await?;

    let live = Guests::find_by_id(token.to_string())
        .one(&txn)
        .await?
        .is_some_and(|guest| guest_service::is_live(&guest, Utc::now()));
    if !live {
        Guests::delete_by_id(token.to_string()).exec(&txn).await?;
        txn.commit().await?;
        tracing::debug!(%user_id, "no live guest session to merge");
        return Ok(0);
    }

    let guest_owner = CartOwner::Guest(token.to_string());
    let user_owner = CartOwner::User(user_id);

    let mut moved = 0u64;
    if let Some(guest_cart) = find_cart(&txn, &guest_owner).await? {
        let items = CartItems::find()
            .filter(CartItemCol::CartId.eq(guest_cart.id))
            .all(&txn)
            .await?;
        moved = items.len() as u64;

        match find_cart(&txn, &user_owner).await? {
            None => {
                let mut active: CartActive = guest_cart.into_active_model();
                active.user_id = Set(Some(user_id));
                active.guest_id = Set(None);
                active.updated_at = Set(Utc::now().into());
                active.update(&txn).await?;
            }
            Some(user_cart) => {
                for item in &items {
                    upsert_item(&txn, user_cart.id, item.product_variant_id, item.quantity).await?;
                }
                Carts::delete_by_id(guest_cart.id).exec(&txn).await?;
                touch(&txn, user_cart).await?;
            }
        }
    }

    Guests::delete_by_id(token.to_string()).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(%user_id, lines = moved, "guest cart merged");
    Ok(moved)
}

/// `INSERT .. ON CONFLICT (cart_id, product_variant_id) DO UPDATE` adding to the quantity.
async fn upsert_item<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    variant_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    let item = CartItemActive {
        id: Set(Uuid::new_v4()),
        cart_id: Set(cart_id),
        product_variant_id: Set(variant_id),
        quantity: Set(quantity),
        created_at: Set(Utc::now().into()),
    };
    CartItems::insert(item)
        .on_conflict(
            OnConflict::columns([CartItemCol::CartId, CartItemCol::ProductVariantId])
                .value(
                    CartItemCol::Quantity,
                    Expr::cust("cart_items.quantity + EXCLUDED.quantity"),
                )
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn touch<C: ConnectionTrait>(conn: &C, cart: CartModel) -> AppResult<()> {
    let mut active: CartActive = cart.into_active_model();
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

/// A product resolves to its default variant, else its oldest one.
async fn resolve_variant<C: ConnectionTrait>(conn: &C, item: CartItemRef) -> AppResult<Uuid> {
    match item {
        CartItemRef::Variant(id) => {
            let variant = ProductVariants::find_by_id(id)
                .one(conn)
                .await?
                .ok_or(AppError::NotFound)?;
            Ok(variant.id)
        }
        CartItemRef::Product(id) => {
            let product = Products::find_by_id(id)
                .filter(ProductCol::IsPublished.eq(true))
                .one(conn)
                .await?
                .ok_or(AppError::NotFound)?;

            if let Some(default_id) = product.default_variant_id {
                let default = ProductVariants::find_by_id(default_id)
                    .filter(VariantCol::ProductId.eq(product.id))
                    .one(conn)
                    .await?;
                if let Some(variant) = default {
                    return Ok(variant.id);
                }
            }

            ProductVariants::find()
                .filter(VariantCol::ProductId.eq(product.id))
                .order_by_asc(VariantCol::CreatedAt)
                .order_by_asc(VariantCol::Id)
                .one(conn)
                .await?
                .map(|v| v.id)
                .ok_or_else(|| AppError::BadRequest("product has no purchasable variants".into()))
        }
    }
}

async fn cart_view<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<CartView> {
    let items = cart_lines(conn, cart_id).await?;
    let item_count = items.iter().map(|l| i64::from(l.quantity)).sum();
    let subtotal = items.iter().map(|l| l.line_total).sum();
    Ok(CartView {
        cart_id,
        items,
        item_count,
        subtotal,
    })
}

/// Cart contents joined with variant, product, color, size and a display image.
pub async fn cart_lines<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<Vec<CartLine>> {
    let items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart_id))
        .order_by_asc(CartItemCol::CreatedAt)
        .order_by_asc(CartItemCol::Id)
        .all(conn)
        .await?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let variants: HashMap<Uuid, _> = ProductVariants::find()
        .filter(VariantCol::Id.is_in(items.iter().map(|i| i.product_variant_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();
    let products: HashMap<Uuid, _> = Products::find()
        .filter(ProductCol::Id.is_in(variants.values().map(|v| v.product_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let colors: HashMap<Uuid, _> = Colors::find()
        .filter(ColorCol::Id.is_in(variants.values().map(|v| v.color_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let sizes: HashMap<Uuid, _> = Sizes::find()
        .filter(SizeCol::Id.is_in(variants.values().map(|v| v.size_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let mut images: HashMap<Uuid, Vec<ImageModel>> = HashMap::new();
    for image in ProductImages::find()
        .filter(ImageCol::ProductId.is_in(products.keys().copied()))
        .order_by_desc(ImageCol::IsPrimary)
        .order_by_asc(ImageCol::SortOrder)
        .order_by_asc(ImageCol::Id)
        .all(conn)
        .await?
    {
        images.entry(image.product_id).or_default().push(image);
    }

    let missing = |what: &str, id: Uuid| AppError::Internal(anyhow::anyhow!("{what} {id} missing"));
    items
        .into_iter()
        .map(|item| {
            let variant = variants
                .get(&item.product_variant_id)
                .ok_or_else(|| missing("variant", item.product_variant_id))?;
            let product = products
                .get(&variant.product_id)
                .ok_or_else(|| missing("product", variant.product_id))?;
            let color = colors
                .get(&variant.color_id)
                .cloned()
                .ok_or_else(|| missing("color", variant.color_id))?;
            let size = sizes
                .get(&variant.size_id)
                .cloned()
                .ok_or_else(|| missing("size", variant.size_id))?;
            let gallery = images.get(&product.id).map(Vec::as_slice).unwrap_or(&[]);
            let unit_price = variant.effective_price();

            Ok(CartLine {
                id: item.id,
                quantity: item.quantity,
                variant_id: variant.id,
                sku: variant.sku.clone(),
                product_id: product.id,
                product_name: product.name.clone(),
                color: color_ref(color),
                size: size_ref(size),
                image: line_image(gallery, variant.id),
                price: variant.price,
                sale_price: variant.sale_price,
                unit_price,
                line_total: unit_price * i64::from(item.quantity),
            })
        })
        .collect()
}

/// Image tagged with the variant when there is one, else the product's lead image.
pub fn line_image(images: &[ImageModel], variant_id: Uuid) -> Option<String> {
    images
        .iter()
        .find(|img| img.variant_id == Some(variant_id))
        .or_else(|| images.first())
        .map(|img| img.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str, variant_id: Option<Uuid>) -> ImageModel {
        ImageModel {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            variant_id,
            url: url.into(),
            sort_order: 0,
            is_primary: false,
        }
    }

    #[test]
    fn line_image_prefers_variant_tag() {
        let variant = Uuid::new_v4();
        let images = vec![image("/lead.jpg", None), image("/variant.jpg", Some(variant))];
        assert_eq!(line_image(&images, variant).as_deref(), Some("/variant.jpg"));
        assert_eq!(line_image(&images, Uuid::new_v4()).as_deref(), Some("/lead.jpg"));
        assert_eq!(line_image(&[], variant), None);
    }
}
