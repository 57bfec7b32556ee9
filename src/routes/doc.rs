use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::{AddressType, CreateAddressRequest},
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartCount, CartItemRef, CartView, UpdateCartItemRequest},
        favorites::{FavoriteList, FavoriteStatus},
        orders::{
            CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems,
            UpdateOrderStatusRequest, WebhookAck, WebhookOutcome,
        },
        products::{CategoryOption, FilterOptions, ProductList},
    },
    models::{
        Address, BrandRef, CartLine, CategoryRef, ColorRef, FavoriteProduct, GenderRef, Order,
        OrderItem, OrderStatus, PriceRange, ProductDetail, ProductImage, ProductSummary,
        ProductVariant, SizeRef, User,
    },
    response::{ApiResponse, Meta},
    routes::{
        addresses, admin, auth, cart, catalog, checkout, favorites, health, orders, params,
        products, webhooks,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        products::list_products,
        products::get_product,
        catalog::filter_options,
        cart::get_cart,
        cart::cart_count,
        cart::add_to_cart,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        checkout::checkout,
        webhooks::stripe_webhook,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        favorites::list_favorites,
        favorites::favorite_status,
        favorites::toggle_favorite,
        addresses::list_addresses,
        addresses::create_address,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status
    ),
    components(
        schemas(
            User,
            CategoryRef,
            BrandRef,
            GenderRef,
            ColorRef,
            SizeRef,
            PriceRange,
            ProductSummary,
            ProductVariant,
            ProductImage,
            ProductDetail,
            CartLine,
            OrderStatus,
            Order,
            OrderItem,
            Address,
            FavoriteProduct,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CartItemRef,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartView,
            CartCount,
            CheckoutRequest,
            CheckoutResponse,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            WebhookOutcome,
            WebhookAck,
            ProductList,
            CategoryOption,
            FilterOptions,
            FavoriteStatus,
            FavoriteList,
            AddressType,
            CreateAddressRequest,
            health::HealthData,
            params::Pagination,
            params::SortOrder,
            params::OrderListQuery,
            params::SortKey,
            params::ProductFilters,
            Meta,
            ApiResponse<ProductList>,
            ApiResponse<ProductDetail>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<LoginResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and sign-in"),
        (name = "Products", description = "Catalog listing and product detail"),
        (name = "Catalog", description = "Filter facets"),
        (name = "Cart", description = "Guest and member cart"),
        (name = "Checkout", description = "Hosted checkout sessions"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Orders", description = "Order history and cancellation"),
        (name = "Favorites", description = "Wishlist endpoints"),
        (name = "Addresses", description = "Shipping and billing addresses"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
