use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::CouponKind;
use crate::pricing::CartTotals;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartLineRequest {
    /// Zero or below deletes the line.
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineDto {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub original_price: Option<Decimal>,
    pub line_total: Decimal,
    /// False when the product was deactivated or removed after being added;
    /// the line is kept and flagged but excluded from all totals.
    pub available: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppliedCouponDto {
    pub code: String,
    pub kind: CouponKind,
    pub discount: Decimal,
}

/// Priced cart view, recomputed from live catalog data on every read.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartLineDto>,
    pub totals: CartTotals,
    pub coupon: Option<AppliedCouponDto>,
    /// Human-readable notices: unavailable lines, a coupon that went stale.
    pub warnings: Vec<String>,
}
