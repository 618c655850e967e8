use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Cart line not found")]
    LineNotFound,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Product is no longer available")]
    ProductInactive,

    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Coupon is not active")]
    CouponInactive,

    #[error("Coupon has expired")]
    CouponExpired,

    #[error("Coupon is not valid yet")]
    CouponNotYetValid,

    #[error("Coupon usage limit reached")]
    CouponUsageLimitReached,

    #[error("Cart does not meet the coupon minimum order value")]
    MinimumOrderNotMet,

    #[error("Coupon does not apply to any item in the cart")]
    CouponNotApplicable,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable kind, stable across message wording changes. The UI
    /// switches on this to render actionable coupon/cart feedback.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "NotFound",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Forbidden => "Forbidden",
            AppError::InvalidQuantity => "InvalidQuantity",
            AppError::LineNotFound => "LineNotFound",
            AppError::ProductNotFound => "ProductNotFound",
            AppError::ProductInactive => "ProductInactive",
            AppError::CouponNotFound => "CouponNotFound",
            AppError::CouponInactive => "CouponInactive",
            AppError::CouponExpired => "CouponExpired",
            AppError::CouponNotYetValid => "CouponNotYetValid",
            AppError::CouponUsageLimitReached => "CouponUsageLimitReached",
            AppError::MinimumOrderNotMet => "MinimumOrderNotMet",
            AppError::CouponNotApplicable => "CouponNotApplicable",
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                "PersistenceFailure"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound
            | AppError::LineNotFound
            | AppError::ProductNotFound
            | AppError::CouponNotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_)
            | AppError::InvalidQuantity
            | AppError::ProductInactive
            | AppError::CouponInactive
            | AppError::CouponExpired
            | AppError::CouponNotYetValid
            | AppError::CouponUsageLimitReached
            | AppError::MinimumOrderNotMet
            | AppError::CouponNotApplicable => StatusCode::BAD_REQUEST,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    kind: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Persistence details never reach the caller.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Something went wrong, please try again".to_string()
        } else {
            self.to_string()
        };

        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData {
                error: message,
                kind: self.kind(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
