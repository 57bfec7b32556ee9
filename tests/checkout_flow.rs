mod common;

use std::sync::Arc;

use common::{
    FakePayments, NewProduct, completed_event, create_image, create_product, create_user,
    create_variant, seed_lookups, setup_state, stripe_signature,
};
use storefront_api::{
    dto::{
        addresses::{AddressType, CreateAddressRequest},
        cart::{AddToCartRequest, CartItemRef},
        orders::{CheckoutRequest, WebhookOutcome},
    },
    error::AppError,
    middleware::{auth::AuthUser, guest::CartOwner},
    models::OrderStatus,
    routes::params::{OrderListQuery, Pagination},
    services::{
        address_service, admin_service, cart_service, checkout_service, favorite_service,
        order_service,
    },
    state::AppState,
};
use uuid::Uuid;

fn shipping(line1: &str, is_default: bool) -> CreateAddressRequest {
    CreateAddressRequest {
        address_type: AddressType::Shipping,
        line1: line1.into(),
        line2: None,
        city: "Portland".into(),
        state: "OR".into(),
        country: "US".into(),
        postal_code: "97201".into(),
        is_default,
    }
}

fn all_orders(status: Option<&str>) -> OrderListQuery {
    OrderListQuery {
        pagination: Pagination {
            page: Some(1),
            per_page: Some(20),
        },
        status: status.map(str::to_string),
        sort_order: None,
    }
}

async fn fill_cart(state: &AppState, user: &AuthUser, items: &[(Uuid, i32)]) -> anyhow::Result<()> {
    let owner = CartOwner::User(user.user_id);
    for (variant, quantity) in items {
        cart_service::add_to_cart(
            state,
            &owner,
            AddToCartRequest {
                item: CartItemRef::Variant(*variant),
                quantity: *quantity,
            },
        )
        .await?;
    }
    Ok(())
}

// Checkout -> webhook -> order lifecycle, plus addresses and favorites.
#[tokio::test]
async fn checkout_webhook_and_order_flow() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let payments = Arc::new(FakePayments::default());
    let state = setup_state(&database_url, payments.clone()).await?;
    let l = seed_lookups(&state).await?;

    let runner = create_product(
        &state,
        NewProduct {
            name: "Runner",
            gender_id: l.men,
            brand_id: l.nike,
            category_id: l.running,
            published: true,
            age_days: 2,
        },
    )
    .await?;
    let runner_black = create_variant(&state, runner, l.black, l.size_10, 5000, None).await?;
    create_image(&state, runner, Some(runner_black), "/img/runner.jpg", 0, true).await?;
    let court = create_product(
        &state,
        NewProduct {
            name: "Court",
            gender_id: l.women,
            brand_id: l.acme,
            category_id: l.lifestyle,
            published: true,
            age_days: 1,
        },
    )
    .await?;
    let court_red = create_variant(&state, court, l.red, l.size_9, 3500, Some(3000)).await?;

    let user = create_user(&state, "user", "user@example.com").await?;
    let other = create_user(&state, "user", "other@example.com").await?;
    let admin = create_user(&state, "admin", "admin@example.com").await?;

    // Nothing to buy yet.
    let empty = checkout_service::checkout(&state, &user, CheckoutRequest::default()).await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    fill_cart(&state, &user, &[(runner_black, 1), (court_red, 2)]).await?;

    // Addresses: a new default demotes the previous one.
    let first = address_service::create_address(&state, &user, shipping("1 Main St", true))
        .await?
        .data
        .expect("address");
    let second = address_service::create_address(&state, &user, shipping("2 Side St", true))
        .await?
        .data
        .expect("address");
    let listed = address_service::list_addresses(&state, &user)
        .await?
        .data
        .expect("addresses");
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|a| a.id == second.id && a.is_default));
    assert!(listed.iter().any(|a| a.id == first.id && !a.is_default));
    let invalid = address_service::create_address(&state, &user, shipping("   ", false)).await;
    assert!(matches!(invalid, Err(AppError::Validation(_))));

    // Someone else's address is rejected.
    let foreign = address_service::create_address(&state, &other, shipping("9 Far Rd", false))
        .await?
        .data
        .expect("address");
    let rejected = checkout_service::checkout(
        &state,
        &user,
        CheckoutRequest {
            shipping_address_id: Some(foreign.id),
            billing_address_id: None,
        },
    )
    .await;
    assert!(matches!(rejected, Err(AppError::Validation(_))));

    // A provider failure leaves no order behind.
    let failing = AppState {
        payments: Arc::new(FakePayments::failing()),
        ..state.clone()
    };
    let failed = checkout_service::checkout(&failing, &user, CheckoutRequest::default()).await;
    assert!(matches!(failed, Err(AppError::Payment(_))));
    let orders = order_service::list_orders(&state, &user, all_orders(None))
        .await?
        .data
        .expect("orders");
    assert!(orders.items.is_empty());

    // Checkout freezes effective prices into a pending order.
    let checkout = checkout_service::checkout(
        &state,
        &user,
        CheckoutRequest {
            shipping_address_id: Some(second.id),
            billing_address_id: None,
        },
    )
    .await?
    .data
    .expect("checkout");
    assert!(checkout.url.contains(&checkout.session_id));
    assert!(checkout.order_number.starts_with("ORD-"));

    let request = payments.last_request().expect("session request");
    assert_eq!(request.total(), 11000);
    assert_eq!(request.customer_email.as_deref(), Some("user@example.com"));
    assert_eq!(request.line_items[0].image.as_deref(), Some("https://shop.test/img/runner.jpg"));
    assert_eq!(
        request.metadata.get("order_id"),
        Some(&checkout.order_id.to_string())
    );

    let order = order_service::get_order(&state, &user, checkout.order_id)
        .await?
        .data
        .expect("order");
    assert_eq!(order.order.status, OrderStatus::Pending);
    assert_eq!(order.order.total_amount, 11000);
    assert_eq!(order.order.shipping_address_id, Some(second.id));
    assert_eq!(order.items.len(), 2);
    let court_item = order
        .items
        .iter()
        .find(|item| item.variant_id == court_red)
        .expect("court item");
    assert_eq!((court_item.price, court_item.line_total), (3000, 6000));
    assert_eq!(court_item.size_name, "9");

    // Other users can't see it.
    let hidden = order_service::get_order(&state, &other, checkout.order_id).await;
    assert!(matches!(hidden, Err(AppError::NotFound)));

    // The cart survives until payment completes.
    let owner = CartOwner::User(user.user_id);
    let count = cart_service::cart_count(&state, &owner).await?.data.expect("count");
    assert_eq!(count.count, 3);

    // Webhook signatures are enforced.
    let payload = completed_event(&checkout.session_id);
    let unsigned = checkout_service::handle_stripe_event(&state, &payload, None).await;
    assert!(matches!(unsigned, Err(AppError::InvalidSignature)));
    let forged = checkout_service::handle_stripe_event(
        &state,
        &payload,
        Some("t=1,v1=deadbeef"),
    )
    .await;
    assert!(matches!(forged, Err(AppError::InvalidSignature)));

    // Completion marks the order paid and empties the cart, once.
    let signature = stripe_signature(&payload);
    let ack = checkout_service::handle_stripe_event(&state, &payload, Some(&signature))
        .await?
        .data
        .expect("ack");
    assert!(ack.received);
    assert_eq!(ack.outcome, WebhookOutcome::Completed);
    let count = cart_service::cart_count(&state, &owner).await?.data.expect("count");
    assert_eq!(count.count, 0);

    let replay = checkout_service::handle_stripe_event(&state, &payload, Some(&signature))
        .await?
        .data
        .expect("ack");
    assert_eq!(replay.outcome, WebhookOutcome::AlreadyProcessed);

    let other_event = serde_json::json!({
        "id": "evt_other",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_1" } }
    })
    .to_string()
    .into_bytes();
    let ignored = checkout_service::handle_stripe_event(
        &state,
        &other_event,
        Some(&stripe_signature(&other_event)),
    )
    .await?
    .data
    .expect("ack");
    assert_eq!(ignored.outcome, WebhookOutcome::Ignored);

    let unknown_session = completed_event("cs_unknown");
    let missing = checkout_service::handle_stripe_event(
        &state,
        &unknown_session,
        Some(&stripe_signature(&unknown_session)),
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    let processing = order_service::list_orders(&state, &user, all_orders(Some("processing")))
        .await?
        .data
        .expect("orders");
    assert_eq!(processing.items.len(), 1);
    let bad_filter = order_service::list_orders(&state, &user, all_orders(Some("paid"))).await;
    assert!(matches!(bad_filter, Err(AppError::Validation(_))));

    // Admin moves it along; once shipped the buyer can no longer cancel.
    let forbidden =
        admin_service::update_order_status(&state, &user, checkout.order_id, OrderStatus::Shipped)
            .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));
    let skipped = admin_service::update_order_status(
        &state,
        &admin,
        checkout.order_id,
        OrderStatus::Delivered,
    )
    .await;
    assert!(matches!(skipped, Err(AppError::BadRequest(_))));
    let shipped =
        admin_service::update_order_status(&state, &admin, checkout.order_id, OrderStatus::Shipped)
            .await?
            .data
            .expect("order");
    assert_eq!(shipped.order.status, OrderStatus::Shipped);
    let late = order_service::cancel_order(&state, &user, checkout.order_id).await;
    assert!(matches!(late, Err(AppError::BadRequest(_))));

    let everything = admin_service::list_all_orders(&state, &admin, all_orders(None))
        .await?
        .data
        .expect("orders");
    assert_eq!(everything.items.len(), 1);

    // A fresh pending order can be cancelled by its owner.
    fill_cart(&state, &user, &[(court_red, 1)]).await?;
    let second_checkout = checkout_service::checkout(&state, &user, CheckoutRequest::default())
        .await?
        .data
        .expect("checkout");
    let cancelled = order_service::cancel_order(&state, &user, second_checkout.order_id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    let twice = order_service::cancel_order(&state, &user, second_checkout.order_id).await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));

    // Favorites toggle on and off.
    let on = favorite_service::toggle_favorite(&state, &user, runner)
        .await?
        .data
        .expect("status");
    assert!(on.is_favorite);
    let listed = favorite_service::list_favorites(
        &state,
        &user,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?
    .data
    .expect("favorites");
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].product.id, runner);
    let off = favorite_service::toggle_favorite(&state, &user, runner)
        .await?
        .data
        .expect("status");
    assert!(!off.is_favorite);
    let check = favorite_service::is_favorite(&state, &user, runner)
        .await?
        .data
        .expect("status");
    assert!(!check.is_favorite);
    let unknown = favorite_service::toggle_favorite(&state, &user, Uuid::new_v4()).await;
    assert!(matches!(unknown, Err(AppError::NotFound)));

    Ok(())
}
