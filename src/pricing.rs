//! Cart pricing and coupon engine.
//!
//! Everything in this module is pure: callers fetch live product rows,
//! redemption counts and the current time, and get back a deterministic
//! totals breakdown. Re-running with unchanged inputs yields identical
//! output, which is what lets the cart read path recompute on every request
//! instead of trusting persisted numbers.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Coupon, CouponKind};

/// One cart line joined with a live catalog snapshot.
///
/// `available` is false when the product has been deactivated or deleted
/// since it was added. Such lines stay in the cart view so the UI can flag
/// them, but they contribute nothing to any total.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub original_price: Option<Decimal>,
    pub category: Option<String>,
    pub available: bool,
}

impl PricedLine {
    pub fn line_total(&self) -> Decimal {
        if self.available {
            self.unit_price * Decimal::from(self.quantity)
        } else {
            Decimal::ZERO
        }
    }

    /// Informational sale discount, already reflected in `unit_price`.
    pub fn line_discount(&self) -> Decimal {
        if !self.available {
            return Decimal::ZERO;
        }
        match self.original_price {
            Some(original) if original > self.unit_price => {
                (original - self.unit_price) * Decimal::from(self.quantity)
            }
            _ => Decimal::ZERO,
        }
    }

    fn eligible_for(&self, coupon: &Coupon) -> bool {
        if !self.available {
            return false;
        }
        if !coupon.is_restricted() {
            return true;
        }
        if coupon.applicable_products.contains(&self.product_id) {
            return true;
        }
        match self.category.as_deref() {
            Some(cat) => coupon
                .applicable_categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(cat)),
            None => false,
        }
    }
}

/// Redemption counts at validation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CouponUsage {
    pub total: i64,
    pub by_user: i64,
}

/// Terminal outcomes of a failed apply attempt. Lookup failures
/// (`CouponNotFound`) happen before validation, at the service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    Inactive,
    NotYetValid,
    Expired,
    UsageLimitReached,
    MinimumOrderNotMet,
    NotApplicable,
}

impl From<CouponRejection> for AppError {
    fn from(rejection: CouponRejection) -> Self {
        match rejection {
            CouponRejection::Inactive => AppError::CouponInactive,
            CouponRejection::NotYetValid => AppError::CouponNotYetValid,
            CouponRejection::Expired => AppError::CouponExpired,
            CouponRejection::UsageLimitReached => AppError::CouponUsageLimitReached,
            CouponRejection::MinimumOrderNotMet => AppError::MinimumOrderNotMet,
            CouponRejection::NotApplicable => AppError::CouponNotApplicable,
        }
    }
}

pub fn subtotal(lines: &[PricedLine]) -> Decimal {
    lines.iter().map(PricedLine::line_total).sum()
}

pub fn product_discount(lines: &[PricedLine]) -> Decimal {
    lines.iter().map(PricedLine::line_discount).sum()
}

pub fn total_items(lines: &[PricedLine]) -> i64 {
    lines
        .iter()
        .filter(|line| line.available)
        .map(|line| i64::from(line.quantity))
        .sum()
}

/// Round to the currency minor unit, half away from zero. Applied once on
/// the final composed fields, never on intermediate line math.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Run the full validation pipeline for one apply attempt and compute the
/// unrounded discount.
///
/// The minimum-order check runs against the full subtotal. When the coupon
/// carries category/product allow-lists, the discount base narrows to the
/// eligible lines; a restricted coupon matching nothing in the cart is
/// rejected rather than applied at zero.
pub fn validate_coupon(
    coupon: &Coupon,
    lines: &[PricedLine],
    usage: CouponUsage,
    now: DateTime<Utc>,
) -> Result<Decimal, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if now < coupon.valid_from {
        return Err(CouponRejection::NotYetValid);
    }
    if now > coupon.valid_until {
        return Err(CouponRejection::Expired);
    }
    if let Some(limit) = coupon.usage_limit {
        if usage.total >= i64::from(limit) {
            return Err(CouponRejection::UsageLimitReached);
        }
    }
    if let Some(limit) = coupon.user_usage_limit {
        if usage.by_user >= i64::from(limit) {
            return Err(CouponRejection::UsageLimitReached);
        }
    }

    let cart_subtotal = subtotal(lines);
    if let Some(minimum) = coupon.min_order_value {
        if cart_subtotal < minimum {
            return Err(CouponRejection::MinimumOrderNotMet);
        }
    }

    let base = if coupon.is_restricted() {
        let eligible: Decimal = lines
            .iter()
            .filter(|line| line.eligible_for(coupon))
            .map(PricedLine::line_total)
            .sum();
        if eligible == Decimal::ZERO {
            return Err(CouponRejection::NotApplicable);
        }
        eligible
    } else {
        cart_subtotal
    };

    let discount = match coupon.kind {
        CouponKind::Percentage => {
            let raw = base * coupon.value / Decimal::ONE_HUNDRED;
            match coupon.max_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        CouponKind::Fixed => coupon.value.min(base),
    };

    // A discount can never exceed what the cart is worth.
    Ok(discount.min(cart_subtotal))
}

/// Final totals, reported to the caller and frozen into orders at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartTotals {
    pub subtotal: Decimal,
    /// Product-level sale discount, informational; already reflected in
    /// `subtotal` and never subtracted again.
    pub discount: Decimal,
    pub coupon_discount: Decimal,
    pub total: Decimal,
    pub total_items: i64,
}

impl CartTotals {
    pub fn empty() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            discount: Decimal::ZERO,
            coupon_discount: Decimal::ZERO,
            total: Decimal::ZERO,
            total_items: 0,
        }
    }
}

/// Compose the totals object from priced lines and an already validated
/// coupon discount (zero when no coupon survives validation).
pub fn compose_totals(lines: &[PricedLine], coupon_discount: Decimal) -> CartTotals {
    let subtotal = subtotal(lines);
    let coupon_discount = coupon_discount.min(subtotal).max(Decimal::ZERO);
    let total = (subtotal - coupon_discount).max(Decimal::ZERO);

    CartTotals {
        subtotal: round_money(subtotal),
        discount: round_money(product_discount(lines)),
        coupon_discount: round_money(coupon_discount),
        total: round_money(total),
        total_items: total_items(lines),
    }
}
