use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Catalog item. `original_price`, when set and above `price`, marks the item
/// as on sale; the delta is the informational product-level discount.
#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub stock: i32,
    pub category: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "coupon_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    Percentage,
    Fixed,
}

/// Code-activated discount rule. Codes are stored upper-cased; lookups
/// normalize before matching. Empty allow-lists mean the coupon applies to
/// every item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub min_order_value: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub user_usage_limit: Option<i32>,
    pub applicable_categories: Vec<String>,
    pub applicable_products: Vec<Uuid>,
    pub is_active: bool,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_restricted(&self) -> bool {
        !self.applicable_categories.is_empty() || !self.applicable_products.is_empty()
    }
}

/// Frozen checkout snapshot; pricing fields are never recomputed from live
/// catalog data after creation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub total_amount: Decimal,
    pub coupon_code: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub invoice_number: String,
    pub shipping_address: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}
