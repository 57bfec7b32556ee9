#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use sha2::Sha256;
use storefront_api::{
    config::{AppConfig, StripeConfig},
    db::{create_pool, orm_from_pool, run_migrations},
    entity::{
        brands::ActiveModel as BrandActive, categories::ActiveModel as CategoryActive,
        colors::ActiveModel as ColorActive, genders::ActiveModel as GenderActive,
        product_images::ActiveModel as ImageActive, product_variants::ActiveModel as VariantActive,
        products::ActiveModel as ProductActive, sizes::ActiveModel as SizeActive,
        users::ActiveModel as UserActive,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    payments::{CheckoutSession, CheckoutSessionRequest, PaymentProvider},
    state::AppState,
};
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Records every session request; optionally refuses them all.
#[derive(Default)]
pub struct FakePayments {
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
    pub fail: bool,
}

impl FakePayments {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_request(&self) -> Option<CheckoutSessionRequest> {
        self.requests.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> AppResult<CheckoutSession> {
        if self.fail {
            return Err(AppError::Payment("card network unavailable".into()));
        }
        let id = format!("cs_test_{}", Uuid::new_v4().simple());
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{id}"),
            id,
        })
    }
}

pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "integration-secret".into(),
        public_base_url: "https://shop.test".into(),
        stripe: StripeConfig {
            secret_key: "sk_test_unused".into(),
            webhook_secret: WEBHOOK_SECRET.into(),
            api_base: "http://127.0.0.1:9".into(),
            currency: "usd".into(),
            webhook_tolerance_secs: 300,
        },
    }
}

/// `TEST_DATABASE_URL`, else `DATABASE_URL`; `None` means the flow should be skipped.
pub fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
            None
        }
    }
}

pub async fn setup_state(
    database_url: &str,
    payments: Arc<dyn PaymentProvider>,
) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = orm_from_pool(pool.clone());
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, carts, guests, wishlists, addresses, \
         product_images, product_variants, products, categories, brands, genders, colors, sizes, users \
         RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        config: Arc::new(test_config(database_url)),
        payments,
    })
}

pub async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{role} tester")),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

/// Lookup rows shared by every seeded product.
pub struct Lookups {
    pub men: Uuid,
    pub women: Uuid,
    pub nike: Uuid,
    pub acme: Uuid,
    pub running: Uuid,
    pub lifestyle: Uuid,
    pub black: Uuid,
    pub red: Uuid,
    pub size_9: Uuid,
    pub size_10: Uuid,
}

pub async fn seed_lookups(state: &AppState) -> anyhow::Result<Lookups> {
    let conn = &state.orm;
    let gender = |label: &str, slug: &str| GenderActive {
        id: Set(Uuid::new_v4()),
        label: Set(label.into()),
        slug: Set(slug.into()),
    };
    let brand = |name: &str, slug: &str| BrandActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        slug: Set(slug.into()),
        logo_url: Set(None),
    };
    let category = |name: &str, slug: &str| CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        slug: Set(slug.into()),
        parent_id: Set(None),
        created_at: Set(Utc::now().into()),
        updated_at: Set(Utc::now().into()),
    };
    let color = |name: &str, slug: &str, hex: &str| ColorActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        slug: Set(slug.into()),
        hex_code: Set(hex.into()),
    };
    let size = |name: &str, sort_order: i32| SizeActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        slug: Set(name.into()),
        sort_order: Set(sort_order),
    };

    Ok(Lookups {
        men: gender("Men", "men").insert(conn).await?.id,
        women: gender("Women", "women").insert(conn).await?.id,
        nike: brand("Nike", "nike").insert(conn).await?.id,
        acme: brand("Acme", "acme").insert(conn).await?.id,
        running: category("Running", "running").insert(conn).await?.id,
        lifestyle: category("Lifestyle", "lifestyle").insert(conn).await?.id,
        black: color("Black", "black", "#000000").insert(conn).await?.id,
        red: color("Red", "red", "#FF0000").insert(conn).await?.id,
        size_9: size("9", 1).insert(conn).await?.id,
        size_10: size("10", 2).insert(conn).await?.id,
    })
}

pub struct NewProduct<'a> {
    pub name: &'a str,
    pub gender_id: Uuid,
    pub brand_id: Uuid,
    pub category_id: Uuid,
    pub published: bool,
    pub age_days: i64,
}

pub async fn create_product(state: &AppState, new: NewProduct<'_>) -> anyhow::Result<Uuid> {
    let created = Utc::now() - Duration::days(new.age_days);
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(new.name.to_string()),
        description: Set(Some(format!("{} for testing", new.name))),
        category_id: Set(new.category_id),
        gender_id: Set(new.gender_id),
        brand_id: Set(new.brand_id),
        is_published: Set(new.published),
        default_variant_id: Set(None),
        created_at: Set(created.into()),
        updated_at: Set(created.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

pub async fn create_variant(
    state: &AppState,
    product_id: Uuid,
    color_id: Uuid,
    size_id: Uuid,
    price: i64,
    sale_price: Option<i64>,
) -> anyhow::Result<Uuid> {
    let variant = VariantActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        sku: Set(format!("SKU-{}", Uuid::new_v4().simple())),
        price: Set(price),
        sale_price: Set(sale_price),
        color_id: Set(color_id),
        size_id: Set(size_id),
        in_stock: Set(10),
        weight: Set(None),
        dimensions: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(variant.id)
}

pub async fn create_image(
    state: &AppState,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    url: &str,
    sort_order: i32,
    is_primary: bool,
) -> anyhow::Result<()> {
    ImageActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        variant_id: Set(variant_id),
        url: Set(url.to_string()),
        sort_order: Set(sort_order),
        is_primary: Set(is_primary),
    }
    .insert(&state.orm)
    .await?;
    Ok(())
}

/// Stripe-Signature header for `payload` signed now with [`WEBHOOK_SECRET`].
pub fn stripe_signature(payload: &[u8]) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac accepts any key");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn completed_event(session_id: &str) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id, "metadata": {} } }
    })
    .to_string()
    .into_bytes()
}
