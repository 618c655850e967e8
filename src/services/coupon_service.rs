use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::coupons::{CouponList, CreateCouponRequest, UpdateCouponRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Coupon, CouponKind},
    pricing::CouponUsage,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// Codes are stored upper-cased; every lookup goes through this so matching
/// is case-insensitive.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub async fn find_by_code(pool: &DbPool, code: &str) -> AppResult<Option<Coupon>> {
    let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1")
        .bind(normalize_code(code))
        .fetch_optional(pool)
        .await?;
    Ok(coupon)
}

pub async fn find_by_id(pool: &DbPool, id: Uuid) -> AppResult<Option<Coupon>> {
    let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(coupon)
}

/// Redemption counts feeding the usage caps check.
pub async fn usage_for(pool: &DbPool, coupon_id: Uuid, user_id: Uuid) -> AppResult<CouponUsage> {
    let row: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(*) FILTER (WHERE user_id = $2)
        FROM coupon_redemptions
        WHERE coupon_id = $1
        "#,
    )
    .bind(coupon_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(CouponUsage {
        total: row.0,
        by_user: row.1,
    })
}

/// Storefront listing: only coupons flagged public and active.
pub async fn list_public(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<CouponList>> {
    let (page, limit, offset) = pagination.normalize();
    let items = sqlx::query_as::<_, Coupon>(
        r#"
        SELECT * FROM coupons
        WHERE is_public = TRUE AND is_active = TRUE AND valid_until >= now()
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM coupons WHERE is_public = TRUE AND is_active = TRUE AND valid_until >= now()",
    )
    .fetch_one(&state.pool)
    .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Coupons", CouponList { items }, Some(meta)))
}

pub async fn list_all(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CouponList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();
    let items = sqlx::query_as::<_, Coupon>(
        "SELECT * FROM coupons ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM coupons")
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Coupons", CouponList { items }, Some(meta)))
}

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;

    let code = normalize_code(&payload.code);
    if code.is_empty() {
        return Err(AppError::BadRequest("code must not be empty".into()));
    }
    validate_value(payload.kind, payload.value)?;
    validate_window(payload.valid_from, payload.valid_until)?;
    validate_limits(payload.usage_limit, payload.user_usage_limit)?;

    let result = sqlx::query_as::<_, Coupon>(
        r#"
        INSERT INTO coupons (
            id, code, kind, value, min_order_value, max_discount,
            valid_from, valid_until, usage_limit, user_usage_limit,
            applicable_categories, applicable_products, is_active, is_public
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&code)
    .bind(payload.kind)
    .bind(payload.value)
    .bind(payload.min_order_value)
    .bind(payload.max_discount)
    .bind(payload.valid_from)
    .bind(payload.valid_until)
    .bind(payload.usage_limit)
    .bind(payload.user_usage_limit)
    .bind(&payload.applicable_categories)
    .bind(&payload.applicable_products)
    .bind(payload.is_active.unwrap_or(true))
    .bind(payload.is_public.unwrap_or(true))
    .fetch_one(&state.pool)
    .await;

    let coupon = match result {
        Ok(coupon) => coupon,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(AppError::BadRequest(format!(
                "Coupon code {code} already exists"
            )));
        }
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_create",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon created",
        coupon,
        Some(Meta::empty()),
    ))
}

pub async fn update_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;

    let existing = match find_by_id(&state.pool, id).await? {
        Some(c) => c,
        None => return Err(AppError::CouponNotFound),
    };

    let value = payload.value.unwrap_or(existing.value);
    validate_value(existing.kind, value)?;
    let valid_from = payload.valid_from.unwrap_or(existing.valid_from);
    let valid_until = payload.valid_until.unwrap_or(existing.valid_until);
    validate_window(valid_from, valid_until)?;
    let usage_limit = payload.usage_limit.or(existing.usage_limit);
    let user_usage_limit = payload.user_usage_limit.or(existing.user_usage_limit);
    validate_limits(usage_limit, user_usage_limit)?;

    let coupon = sqlx::query_as::<_, Coupon>(
        r#"
        UPDATE coupons SET
            value = $2, min_order_value = $3, max_discount = $4,
            valid_from = $5, valid_until = $6,
            usage_limit = $7, user_usage_limit = $8,
            applicable_categories = $9, applicable_products = $10,
            is_active = $11, is_public = $12
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(value)
    .bind(payload.min_order_value.or(existing.min_order_value))
    .bind(payload.max_discount.or(existing.max_discount))
    .bind(valid_from)
    .bind(valid_until)
    .bind(usage_limit)
    .bind(user_usage_limit)
    .bind(
        payload
            .applicable_categories
            .unwrap_or(existing.applicable_categories),
    )
    .bind(
        payload
            .applicable_products
            .unwrap_or(existing.applicable_products),
    )
    .bind(payload.is_active.unwrap_or(existing.is_active))
    .bind(payload.is_public.unwrap_or(existing.is_public))
    .fetch_one(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_update",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon updated",
        coupon,
        Some(Meta::empty()),
    ))
}

pub async fn delete_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::CouponNotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_delete",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn validate_value(kind: CouponKind, value: Decimal) -> Result<(), AppError> {
    if value <= Decimal::ZERO {
        return Err(AppError::BadRequest("value must be positive".into()));
    }
    if kind == CouponKind::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(AppError::BadRequest(
            "percentage value must not exceed 100".into(),
        ));
    }
    Ok(())
}

fn validate_window(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<(), AppError> {
    if until < from {
        return Err(AppError::BadRequest(
            "valid_until must not precede valid_from".into(),
        ));
    }
    Ok(())
}

fn validate_limits(usage_limit: Option<i32>, user_usage_limit: Option<i32>) -> Result<(), AppError> {
    for limit in [usage_limit, user_usage_limit].into_iter().flatten() {
        if limit < 1 {
            return Err(AppError::BadRequest("usage limits must be at least 1".into()));
        }
    }
    Ok(())
}
