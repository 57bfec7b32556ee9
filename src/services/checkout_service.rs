use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dto::orders::{CheckoutRequest, CheckoutResponse, WebhookAck, WebhookOutcome},
    entity::{
        Addresses, Orders, Users,
        addresses::Column as AddressCol,
        order_items::ActiveModel as OrderItemActive,
        orders::ActiveModel as OrderActive,
    },
    error::{AppError, AppResult, FieldError},
    middleware::{auth::AuthUser, guest::CartOwner},
    models::{CartLine, OrderStatus},
    payments::{
        CheckoutLineItem, CheckoutSessionRequest,
        webhook::{self, CHECKOUT_COMPLETED},
    },
    response::ApiResponse,
    services::{
        cart_service::{cart_lines, find_cart},
        order_service::{self, build_order_number},
    },
    state::AppState,
};

/// Turn the signed-in user's cart into a pending order and a hosted checkout session.
///
/// The order and its items are written in one transaction with each line's
/// effective price frozen. If the payment provider then fails, the order is
/// deleted again. The cart itself is only emptied once payment completes.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let owner = CartOwner::User(user.user_id);
    let cart = find_cart(&state.orm, &owner)
        .await?
        .ok_or_else(|| AppError::BadRequest("Cart is empty".into()))?;
    let lines = cart_lines(&state.orm, cart.id).await?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    check_addresses(state, user, &payload).await?;

    let customer = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let order_id = Uuid::new_v4();
    let order_number = build_order_number(Utc::now().timestamp_millis(), order_id);
    let total_amount: i64 = lines.iter().map(|l| l.line_total).sum();

    let txn = state.orm.begin().await?;
    let now = Utc::now();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        order_number: Set(order_number.clone()),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        total_amount: Set(total_amount),
        shipping_address_id: Set(payload.shipping_address_id),
        billing_address_id: Set(payload.billing_address_id),
        stripe_session_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    for line in &lines {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_variant_id: Set(line.variant_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    let request = session_request(
        &state.config,
        &lines,
        order.id,
        user.user_id,
        Some(customer.email),
    );

    let session = match state.payments.create_checkout_session(&request).await {
        Ok(session) => session,
        Err(err) => {
            if let Err(cleanup) = Orders::delete_by_id(order.id).exec(&state.orm).await {
                tracing::warn!(order_id = %order.id, error = %cleanup, "failed to remove unpaid order");
            }
            tracing::warn!(order_id = %order.id, "checkout session creation failed, order removed");
            return Err(err);
        }
    };

    let mut active = order.into_active_model();
    active.stripe_session_id = Set(Some(session.id.clone()));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    tracing::info!(
        order_id = %order.id,
        session_id = %session.id,
        total_amount,
        "checkout session created"
    );

    Ok(ApiResponse::success(
        "Checkout session created",
        CheckoutResponse {
            url: session.url,
            order_id: order.id,
            order_number: order.order_number,
            session_id: session.id,
        },
        None,
    ))
}

/// Verify and apply a provider webhook delivery.
///
/// Only `checkout.session.completed` changes state; other event types are
/// acknowledged and ignored.
pub async fn handle_stripe_event(
    state: &AppState,
    payload: &[u8],
    signature: Option<&str>,
) -> AppResult<ApiResponse<WebhookAck>> {
    let stripe = &state.config.stripe;
    let signature = signature.ok_or(AppError::InvalidSignature)?;
    let event = webhook::construct_event(
        payload,
        signature,
        &stripe.webhook_secret,
        stripe.webhook_tolerance_secs,
        Utc::now().timestamp(),
    )
    .inspect_err(|err| tracing::warn!(error = %err, "webhook rejected"))?;

    let outcome = if event.event_type == CHECKOUT_COMPLETED {
        order_service::complete_checkout_session(state, &event.data.object.id).await?
    } else {
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "webhook ignored");
        WebhookOutcome::Ignored
    };

    Ok(ApiResponse::success(
        "Webhook processed",
        WebhookAck {
            received: true,
            outcome,
        },
        None,
    ))
}

async fn check_addresses(
    state: &AppState,
    user: &AuthUser,
    payload: &CheckoutRequest,
) -> AppResult<()> {
    let mut errors = Vec::new();
    for (field, id) in [
        ("shipping_address_id", payload.shipping_address_id),
        ("billing_address_id", payload.billing_address_id),
    ] {
        let Some(id) = id else { continue };
        let owned = Addresses::find_by_id(id)
            .filter(AddressCol::UserId.eq(user.user_id))
            .one(&state.orm)
            .await?
            .is_some();
        if !owned {
            errors.push(FieldError::new(field, "address not found"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Provider request for a set of cart lines, priced at their effective unit price.
pub fn session_request(
    config: &AppConfig,
    lines: &[CartLine],
    order_id: Uuid,
    user_id: Uuid,
    customer_email: Option<String>,
) -> CheckoutSessionRequest {
    let base = config.public_base_url.as_str();
    let line_items = lines
        .iter()
        .map(|line| CheckoutLineItem {
            name: line.product_name.clone(),
            description: format!("{} • Size {}", line.color.name, line.size.name),
            image: line.image.as_deref().map(|img| absolute_url(base, img)),
            unit_amount: line.unit_price,
            quantity: line.quantity,
        })
        .collect();

    let mut metadata = BTreeMap::new();
    metadata.insert("order_id".to_string(), order_id.to_string());
    metadata.insert("user_id".to_string(), user_id.to_string());

    CheckoutSessionRequest {
        line_items,
        currency: config.stripe.currency.clone(),
        success_url: format!("{base}/orders/success?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base}/orders/cancel"),
        customer_email,
        metadata,
    }
}

pub fn absolute_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
