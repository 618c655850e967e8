//! Cart line aggregator and the priced read path.
//!
//! Mutations persist immediately and never store totals; every read joins
//! the cart against live catalog rows and runs the pricing engine, so a
//! price change or a coupon going stale shows up on the next request.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{
        AddToCartRequest, AppliedCouponDto, ApplyCouponRequest, CartLineDto, CartView,
        UpdateCartLineRequest,
    },
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    pricing::{self, CartTotals, PricedLine},
    response::{ApiResponse, Meta},
    services::coupon_service,
    state::AppState,
};

#[derive(FromRow)]
struct LineRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    price: Decimal,
    original_price: Option<Decimal>,
    category: Option<String>,
    is_active: bool,
}

impl LineRow {
    fn to_priced_line(&self) -> PricedLine {
        PricedLine {
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price: self.price,
            original_price: self.original_price,
            category: self.category.clone(),
            available: self.is_active,
        }
    }
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let view = match find_cart(state, user.user_id).await? {
        Some(cart) => build_view(state, user, &cart).await?,
        None => empty_view(),
    };
    Ok(ApiResponse::success("OK", view, None))
}

pub async fn add_line(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    if payload.quantity < 1 {
        return Err(AppError::InvalidQuantity);
    }

    let product: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(&state.pool)
        .await?;
    match product {
        None => return Err(AppError::ProductNotFound),
        Some((false,)) => return Err(AppError::ProductInactive),
        Some((true,)) => {}
    }

    let cart = find_or_create_cart(state, user.user_id).await?;

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;

    match existing {
        Some(item) => {
            // Repeated adds accumulate; use the update endpoint to set an
            // absolute quantity.
            let quantity = item
                .quantity
                .checked_add(payload.quantity)
                .ok_or_else(|| AppError::BadRequest("quantity is too large".into()))?;
            let mut active: CartItemActive = item.into();
            active.quantity = Set(quantity);
            active.update(&state.orm).await?;
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(payload.product_id),
                quantity: Set(payload.quantity),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?;
        }
    }
    touch(state, &cart).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = build_view(state, user, &cart).await?;
    Ok(ApiResponse::success("Added to cart", view, None))
}

pub async fn update_line(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartLineRequest,
) -> AppResult<ApiResponse<CartView>> {
    let cart = find_cart(state, user.user_id)
        .await?
        .ok_or(AppError::LineNotFound)?;

    let item = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::LineNotFound)?;

    if payload.quantity <= 0 {
        // Delete-by-zero convention: setting a line to zero removes it.
        CartItems::delete_by_id(item.id).exec(&state.orm).await?;
    } else {
        let mut active: CartItemActive = item.into();
        active.quantity = Set(payload.quantity);
        active.update(&state.orm).await?;
    }
    touch(state, &cart).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = build_view(state, user, &cart).await?;
    Ok(ApiResponse::success("Cart updated", view, None))
}

pub async fn remove_line(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let cart = find_cart(state, user.user_id)
        .await?
        .ok_or(AppError::LineNotFound)?;

    let result = CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::LineNotFound);
    }
    touch(state, &cart).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = build_view(state, user, &cart).await?;
    Ok(ApiResponse::success("Removed from cart", view, None))
}

/// Empties all lines and detaches any applied coupon.
pub async fn clear(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    if let Some(cart) = find_cart(state, user.user_id).await? {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart.id))
            .exec(&state.orm)
            .await?;

        let mut active: CartActive = cart.into();
        active.coupon_id = Set(None);
        active.coupon_discount = Set(None);
        active.updated_at = Set(Utc::now().into());
        active.update(&state.orm).await?;
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_clear",
        Some("cart_items"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Cart cleared",
        empty_view(),
        Some(Meta::empty()),
    ))
}

pub async fn apply_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: ApplyCouponRequest,
) -> AppResult<ApiResponse<CartView>> {
    let cart = find_cart(state, user.user_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Cart is empty".into()))?;

    let rows = fetch_lines(state, cart.id).await?;
    if rows.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }
    let lines: Vec<PricedLine> = rows.iter().map(LineRow::to_priced_line).collect();

    let coupon = coupon_service::find_by_code(&state.pool, &payload.code)
        .await?
        .ok_or(AppError::CouponNotFound)?;
    let usage = coupon_service::usage_for(&state.pool, coupon.id, user.user_id).await?;

    // A rejection leaves the cart untouched.
    let discount = pricing::validate_coupon(&coupon, &lines, usage, Utc::now())?;

    let mut active: CartActive = cart.into();
    active.coupon_id = Set(Some(coupon.id));
    active.coupon_discount = Set(Some(pricing::round_money(discount)));
    active.updated_at = Set(Utc::now().into());
    let cart = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_apply",
        Some("carts"),
        Some(serde_json::json!({ "code": coupon.code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = build_view(state, user, &cart).await?;
    Ok(ApiResponse::success("Coupon applied", view, None))
}

/// Unconditional detach; no validation needed to take a coupon off.
pub async fn remove_coupon(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let cart = match find_cart(state, user.user_id).await? {
        Some(cart) => cart,
        None => return Ok(ApiResponse::success("OK", empty_view(), None)),
    };

    let mut active: CartActive = cart.into();
    active.coupon_id = Set(None);
    active.coupon_discount = Set(None);
    active.updated_at = Set(Utc::now().into());
    let cart = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_remove",
        Some("carts"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = build_view(state, user, &cart).await?;
    Ok(ApiResponse::success("Coupon removed", view, None))
}

pub async fn find_cart(state: &AppState, user_id: Uuid) -> AppResult<Option<CartModel>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?;
    Ok(cart)
}

/// Carts are created lazily on first mutation.
async fn find_or_create_cart(state: &AppState, user_id: Uuid) -> AppResult<CartModel> {
    if let Some(cart) = find_cart(state, user_id).await? {
        return Ok(cart);
    }
    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        coupon_id: Set(None),
        coupon_discount: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(cart)
}

async fn touch(state: &AppState, cart: &CartModel) -> AppResult<()> {
    let mut active: CartActive = cart.clone().into();
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;
    Ok(())
}

async fn fetch_lines(state: &AppState, cart_id: Uuid) -> AppResult<Vec<LineRow>> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT ci.product_id, ci.quantity,
               p.name, p.price, p.original_price, p.category, p.is_active
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at ASC
        "#,
    )
    .bind(cart_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(rows)
}

fn empty_view() -> CartView {
    CartView {
        items: Vec::new(),
        totals: CartTotals::empty(),
        coupon: None,
        warnings: Vec::new(),
    }
}

async fn build_view(state: &AppState, user: &AuthUser, cart: &CartModel) -> AppResult<CartView> {
    let rows = fetch_lines(state, cart.id).await?;
    let lines: Vec<PricedLine> = rows.iter().map(LineRow::to_priced_line).collect();

    let mut warnings: Vec<String> = rows
        .iter()
        .filter(|row| !row.is_active)
        .map(|row| {
            format!(
                "{} is no longer available and is excluded from totals",
                row.name
            )
        })
        .collect();

    // Re-validate any attached coupon against the live cart; a stale coupon
    // contributes nothing and is reported instead of silently kept.
    let mut coupon_dto = None;
    let mut coupon_discount = Decimal::ZERO;
    if let Some(coupon_id) = cart.coupon_id {
        match coupon_service::find_by_id(&state.pool, coupon_id).await? {
            Some(coupon) => {
                let usage = coupon_service::usage_for(&state.pool, coupon.id, user.user_id).await?;
                match pricing::validate_coupon(&coupon, &lines, usage, Utc::now()) {
                    Ok(amount) => {
                        coupon_discount = amount;
                        coupon_dto = Some(AppliedCouponDto {
                            code: coupon.code,
                            kind: coupon.kind,
                            discount: pricing::round_money(amount),
                        });
                    }
                    Err(_) => warnings.push(format!(
                        "Coupon {} is no longer valid and was not applied",
                        coupon.code
                    )),
                }
            }
            None => warnings.push("The applied coupon no longer exists".to_string()),
        }
    }

    let totals = pricing::compose_totals(&lines, coupon_discount);

    let items = rows
        .iter()
        .zip(&lines)
        .map(|(row, line)| CartLineDto {
            product_id: row.product_id,
            name: row.name.clone(),
            quantity: row.quantity,
            unit_price: row.price,
            original_price: row.original_price,
            line_total: pricing::round_money(line.line_total()),
            available: row.is_active,
        })
        .collect();

    Ok(CartView {
        items,
        totals,
        coupon: coupon_dto,
        warnings,
    })
}
