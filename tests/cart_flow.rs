mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{NewProduct, create_product, create_user, create_variant, seed_lookups, setup_state};
use sea_orm::{ActiveModelTrait, Set};
use storefront_api::{
    dto::{
        auth::{LoginRequest, RegisterRequest},
        cart::{AddToCartRequest, CartItemRef},
    },
    entity::guests::ActiveModel as GuestActive,
    error::AppError,
    middleware::guest::CartOwner,
    services::{auth_service, cart_service, guest_service},
};

fn add(item: CartItemRef, quantity: i32) -> AddToCartRequest {
    AddToCartRequest { item, quantity }
}

// Guest cart: add/merge lines, update and remove, then carry it into an account.
#[tokio::test]
async fn guest_cart_and_merge_flow() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url, Arc::new(common::FakePayments::default())).await?;
    let l = seed_lookups(&state).await?;

    let runner = create_product(
        &state,
        NewProduct {
            name: "Runner",
            gender_id: l.men,
            brand_id: l.nike,
            category_id: l.running,
            published: true,
            age_days: 1,
        },
    )
    .await?;
    let black = create_variant(&state, runner, l.black, l.size_9, 5000, None).await?;
    let red = create_variant(&state, runner, l.red, l.size_10, 7000, Some(4000)).await?;

    // A new guest is minted once, then reused.
    let guest = guest_service::resolve_guest(&state, None).await?;
    assert!(guest.created);
    let again = guest_service::resolve_guest(&state, Some(&guest.token)).await?;
    assert!(!again.created);
    assert_eq!(again.token, guest.token);
    let owner = CartOwner::Guest(guest.token.clone());

    // A product reference resolves to its oldest variant when no default is set.
    let view = cart_service::add_to_cart(&state, &owner, add(CartItemRef::Product(runner), 2))
        .await?
        .data
        .expect("cart");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].variant_id, black);
    assert_eq!(view.subtotal, 10000);

    // Same variant again adds to the existing line.
    let view = cart_service::add_to_cart(&state, &owner, add(CartItemRef::Variant(black), 1))
        .await?
        .data
        .expect("cart");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);

    // Sale price wins.
    let view = cart_service::add_to_cart(&state, &owner, add(CartItemRef::Variant(red), 1))
        .await?
        .data
        .expect("cart");
    let red_line = view
        .items
        .iter()
        .find(|line| line.variant_id == red)
        .expect("red line");
    assert_eq!(red_line.unit_price, 4000);
    assert_eq!(view.item_count, 4);
    assert_eq!(view.subtotal, 3 * 5000 + 4000);

    let count = cart_service::cart_count(&state, &owner).await?.data.expect("count");
    assert_eq!(count.count, 4);

    let bad = cart_service::add_to_cart(&state, &owner, add(CartItemRef::Variant(red), 0)).await;
    assert!(matches!(bad, Err(AppError::Validation(_))));
    let unknown =
        cart_service::add_to_cart(&state, &owner, add(CartItemRef::Variant(uuid::Uuid::new_v4()), 1))
            .await;
    assert!(matches!(unknown, Err(AppError::NotFound)));

    // Quantity updates; zero removes the line.
    let black_line = view
        .items
        .iter()
        .find(|line| line.variant_id == black)
        .map(|line| line.id)
        .expect("black line");
    let view = cart_service::update_quantity(&state, &owner, black_line, 1)
        .await?
        .data
        .expect("cart");
    assert_eq!(view.item_count, 2);
    let red_line_id = red_line.id;
    let view = cart_service::update_quantity(&state, &owner, red_line_id, 0)
        .await?
        .data
        .expect("cart");
    assert_eq!(view.items.len(), 1);
    let gone = cart_service::remove_from_cart(&state, &owner, red_line_id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    // Another owner cannot touch this cart's lines.
    let shopper = create_user(&state, "user", "shopper@example.com").await?;
    let shopper_owner = CartOwner::User(shopper.user_id);
    cart_service::add_to_cart(&state, &shopper_owner, add(CartItemRef::Variant(black), 2)).await?;
    let foreign = cart_service::update_quantity(&state, &shopper_owner, black_line, 5).await;
    assert!(matches!(foreign, Err(AppError::NotFound)));

    // Merging folds the guest line into the user's existing one.
    let moved = cart_service::merge_guest_cart(&state, &guest.token, shopper.user_id).await?;
    assert_eq!(moved, 1);
    let merged = cart_service::get_cart(&state, &shopper_owner)
        .await?
        .data
        .expect("cart");
    assert_eq!(merged.items.len(), 1);
    assert_eq!(merged.items[0].quantity, 3);

    // The guest session is gone; presenting it mints a fresh one.
    let after = guest_service::resolve_guest(&state, Some(&guest.token)).await?;
    assert!(after.created);
    assert_ne!(after.token, guest.token);

    // Registering with a guest cart re-owns it in place.
    let owner = CartOwner::Guest(after.token.clone());
    cart_service::add_to_cart(&state, &owner, add(CartItemRef::Variant(red), 2)).await?;
    let registered = auth_service::register_user(
        &state,
        RegisterRequest {
            name: "New Buyer".into(),
            email: "  Buyer@Example.com ".into(),
            password: "correct-horse".into(),
        },
        Some(&after.token),
    )
    .await?
    .data
    .expect("login");
    assert_eq!(registered.merged_cart_items, Some(1));
    assert_eq!(registered.user.email, "buyer@example.com");
    assert!(registered.token.starts_with("Bearer "));

    let buyer_cart = cart_service::get_cart(&state, &CartOwner::User(registered.user.id))
        .await?
        .data
        .expect("cart");
    assert_eq!(buyer_cart.item_count, 2);
    assert_eq!(buyer_cart.subtotal, 8000);

    // An expired guest session carries nothing over, and its cart is dropped.
    let stale = guest_service::resolve_guest(&state, None).await?;
    let stale_owner = CartOwner::Guest(stale.token.clone());
    cart_service::add_to_cart(&state, &stale_owner, add(CartItemRef::Variant(black), 1)).await?;
    GuestActive {
        session_token: Set(stale.token.clone()),
        expires_at: Set((Utc::now() - Duration::hours(1)).into()),
        ..Default::default()
    }
    .update(&state.orm)
    .await?;
    let moved = cart_service::merge_guest_cart(&state, &stale.token, registered.user.id).await?;
    assert_eq!(moved, 0);
    assert!(cart_service::find_cart(&state.orm, &stale_owner).await?.is_none());
    let buyer_cart = cart_service::get_cart(&state, &CartOwner::User(registered.user.id))
        .await?
        .data
        .expect("cart");
    assert_eq!(buyer_cart.item_count, 2);

    let duplicate = auth_service::register_user(
        &state,
        RegisterRequest {
            name: "Again".into(),
            email: "buyer@example.com".into(),
            password: "correct-horse".into(),
        },
        None,
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Validation(_))));

    // Login with a stale guest token still succeeds.
    let login = auth_service::login_user(
        &state,
        LoginRequest {
            email: "buyer@example.com".into(),
            password: "correct-horse".into(),
        },
        Some("not-a-guest"),
    )
    .await?
    .data
    .expect("login");
    assert_eq!(login.merged_cart_items, Some(0));

    let wrong = auth_service::login_user(
        &state,
        LoginRequest {
            email: "buyer@example.com".into(),
            password: "nope".into(),
        },
        None,
    )
    .await;
    assert!(matches!(wrong, Err(AppError::BadRequest(_))));

    Ok(())
}
