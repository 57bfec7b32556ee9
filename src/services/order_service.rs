use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderWithItems, WebhookOutcome},
    entity::{
        CartItems, Carts, Colors, OrderItems, Orders, ProductImages, ProductVariants, Products,
        Sizes,
        cart_items::Column as CartItemCol,
        carts::Column as CartCol,
        colors::Column as ColorCol,
        order_items::{Column as OrderItemCol, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Model as OrderModel},
        product_images::{Column as ImageCol, Model as ImageModel},
        product_variants::Column as VariantCol,
        products::Column as ProductCol,
        sizes::Column as SizeCol,
    },
    error::{AppError, AppResult, FieldError},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::cart_service::line_image,
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    let (list, meta) = paged_orders(&state.orm, condition, query).await?;
    Ok(ApiResponse::success("Ok", list, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = order_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let status = parse_status(&order.status)?;
    if !status.can_cancel() {
        return Err(AppError::BadRequest(format!(
            "Order cannot be cancelled while {status}"
        )));
    }

    let order = set_status(&txn, order, OrderStatus::Cancelled).await?;
    txn.commit().await?;

    tracing::info!(order_id = %order.id, from = %status, "order cancelled");
    let data = order_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("Order cancelled", data, Some(Meta::empty())))
}

/// Apply a completed checkout session: mark the order paid and empty the buyer's cart.
///
/// Replays are no-ops once the order has reached a paid state.
pub async fn complete_checkout_session(
    state: &AppState,
    session_id: &str,
) -> AppResult<WebhookOutcome> {
    let txn = state.orm.begin().await?;

    let Some(order) = Orders::find()
        .filter(OrderCol::StripeSessionId.eq(session_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        tracing::warn!(%session_id, "no order for checkout session");
        return Err(AppError::NotFound);
    };

    let status = parse_status(&order.status)?;
    if status.is_paid() {
        tracing::info!(order_id = %order.id, %status, "checkout session already processed");
        return Ok(WebhookOutcome::AlreadyProcessed);
    }

    let user_id = order.user_id;
    let order = set_status(&txn, order, OrderStatus::Processing).await?;

    // Items go, the cart row stays.
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(&txn)
        .await?
    {
        let cleared = CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        tracing::debug!(cart_id = %cart.id, removed = cleared.rows_affected, "cart cleared after payment");
    }

    txn.commit().await?;
    tracing::info!(order_id = %order.id, %session_id, "order paid");
    Ok(WebhookOutcome::Completed)
}

pub(crate) async fn paged_orders<C: ConnectionTrait>(
    conn: &C,
    mut condition: Condition,
    query: OrderListQuery,
) -> AppResult<(OrderList, Meta)> {
    let (page, limit, offset) = query.pagination.normalize();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status
            .parse()
            .map_err(|e: String| AppError::Validation(vec![FieldError::new("status", e)]))?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let finder: Select<Orders> = Orders::find().filter(condition);
    let finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder
            .order_by_asc(OrderCol::CreatedAt)
            .order_by_asc(OrderCol::Id),
        SortOrder::Desc => finder
            .order_by_desc(OrderCol::CreatedAt)
            .order_by_asc(OrderCol::Id),
    };

    let total = finder.clone().count(conn).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(conn)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok((OrderList { items }, Meta::new(page, limit, total)))
}

pub(crate) async fn set_status<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    status: OrderStatus,
) -> AppResult<OrderModel> {
    let mut active: OrderActive = order.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

pub(crate) fn parse_status(raw: &str) -> AppResult<OrderStatus> {
    raw.parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
}

pub(crate) fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        order_number: model.order_number,
        status: parse_status(&model.status)?,
        total_amount: model.total_amount,
        shipping_address_id: model.shipping_address_id,
        billing_address_id: model.billing_address_id,
        stripe_session_id: model.stripe_session_id,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

/// Order plus its items with product name, image, color and size.
pub(crate) async fn order_with_items<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let rows: Vec<OrderItemModel> = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::Id)
        .all(conn)
        .await?;

    let variants: HashMap<Uuid, _> = ProductVariants::find()
        .filter(VariantCol::Id.is_in(rows.iter().map(|r| r.product_variant_id)))
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
    let colors: HashMap<Uuid, String> = Colors::find()
        .filter(ColorCol::Id.is_in(variants.values().map(|v| v.color_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();
    let sizes: HashMap<Uuid, String> = Sizes::find()
        .filter(SizeCol::Id.is_in(variants.values().map(|v| v.size_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();
    let mut images: HashMap<Uuid, Vec<ImageModel>> = HashMap::new();
    for image in ProductImages::find()
        .filter(ImageCol::ProductId.is_in(products.keys().copied()))
        .order_by_desc(ImageCol::IsPrimary)
        .order_by_asc(ImageCol::SortOrder)
        .all(conn)
        .await?
    {
        images.entry(image.product_id).or_default().push(image);
    }

    let items = rows
        .into_iter()
        .map(|row| {
            let variant = variants.get(&row.product_variant_id).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("variant {} missing", row.product_variant_id))
            })?;
            let product = products.get(&variant.product_id).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("product {} missing", variant.product_id))
            })?;
            let gallery = images.get(&product.id).map(Vec::as_slice).unwrap_or(&[]);
            Ok(OrderItem {
                id: row.id,
                order_id: row.order_id,
                variant_id: variant.id,
                quantity: row.quantity,
                price: row.price,
                line_total: row.price * i64::from(row.quantity),
                product_id: product.id,
                product_name: product.name.clone(),
                image: line_image(gallery, variant.id),
                color_name: colors.get(&variant.color_id).cloned().unwrap_or_default(),
                size_name: sizes.get(&variant.size_id).cloned().unwrap_or_default(),
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(OrderWithItems {
        order: order_from_entity(order)?,
        items,
    })
}

/// `ORD-<base36 unix millis>-<8 uppercase hex>`.
pub fn build_order_number(millis: i64, id: Uuid) -> String {
    let suffix: String = id.simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", to_base36(millis.max(0) as u64), suffix)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}
