use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BrandRef {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GenderRef {
    pub id: Uuid,
    pub label: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ColorRef {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub hex_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SizeRef {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub sort_order: i32,
}

/// Effective price span across a product's variants, in minor units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
pub struct PriceRange {
    pub min: i64,
    pub max: i64,
}

impl PriceRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Fold a set of effective prices into a range; empty input yields `0..0`.
    pub fn from_prices<I: IntoIterator<Item = i64>>(prices: I) -> Self {
        let mut iter = prices.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        iter.fold(Self::new(first, first), |acc, p| {
            Self::new(acc.min.min(p), acc.max.max(p))
        })
    }

    /// Variants span more than one effective price.
    pub fn is_range(&self) -> bool {
        self.min < self.max
    }

    pub fn label(&self) -> String {
        if self.is_range() {
            format!("{} - {}", format_price(self.min), format_price(self.max))
        } else {
            format_price(self.min)
        }
    }
}

/// Render minor units as a dollar amount, e.g. `11000 -> "$110.00"`.
pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub min_price: i64,
    pub max_price: i64,
    pub has_price_range: bool,
    pub price_label: String,
    pub images: Vec<String>,
    pub category: CategoryRef,
    pub brand: BrandRef,
    pub gender: GenderRef,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductVariant {
    pub id: Uuid,
    pub sku: String,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub effective_price: i64,
    pub color: ColorRef,
    pub size: SizeRef,
    pub in_stock: i32,
    pub weight: Option<f32>,
    #[schema(value_type = Option<Object>)]
    pub dimensions: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductImage {
    pub id: Uuid,
    pub url: String,
    pub sort_order: i32,
    pub is_primary: bool,
    pub variant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductDetail {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: CategoryRef,
    pub brand: BrandRef,
    pub gender: GenderRef,
    pub default_variant_id: Option<Uuid>,
    pub variants: Vec<ProductVariant>,
    pub images: Vec<ProductImage>,
    pub min_price: i64,
    pub max_price: i64,
    pub has_price_range: bool,
    pub price_label: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub quantity: i32,
    pub variant_id: Uuid,
    pub sku: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub color: ColorRef,
    pub size: SizeRef,
    pub image: Option<String>,
    pub price: i64,
    pub sale_price: Option<i64>,
    pub unit_price: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Cancellation is only allowed before the order ships.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
            (_, Cancelled) => self.can_cancel(),
            _ => false,
        }
    }

    /// Payment has been confirmed for orders in these states.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub shipping_address_id: Option<Uuid>,
    pub billing_address_id: Option<Uuid>,
    pub stripe_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    pub price: i64,
    pub line_total: i64,
    pub product_id: Uuid,
    pub product_name: String,
    pub image: Option<String>,
    pub color_name: String,
    pub size_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_type: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoriteProduct {
    pub id: Uuid,
    pub product: ProductSummary,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_price_renders_without_range() {
        let range = PriceRange::from_prices([5000, 5000, 5000]);
        assert!(!range.is_range());
        assert_eq!(range.label(), "$50.00");
    }

    #[test]
    fn spread_prices_render_as_range() {
        let range = PriceRange::from_prices([8000, 4999, 6500]);
        assert_eq!(range, PriceRange::new(4999, 8000));
        assert!(range.is_range());
        assert_eq!(range.label(), "$49.99 - $80.00");
    }

    #[test]
    fn empty_prices_fold_to_zero() {
        assert_eq!(PriceRange::from_prices(Vec::new()), PriceRange::new(0, 0));
    }

    #[test]
    fn format_price_pads_cents() {
        assert_eq!(format_price(11000), "$110.00");
        assert_eq!(format_price(5), "$0.05");
        assert_eq!(format_price(-250), "-$2.50");
    }

    #[test]
    fn cancellation_is_gated_by_status() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn transitions_follow_fulfilment_order() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Processing));
        assert!(!Shipped.can_transition_to(Pending));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("paid".parse::<OrderStatus>().is_err());
    }
}
