use chrono::{Duration, Utc};
use gemstore_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool},
    dto::{
        cart::{AddToCartRequest, ApplyCouponRequest, UpdateCartLineRequest},
        orders::{CheckoutRequest, PayOrderRequest},
    },
    error::AppError,
    middleware::auth::AuthUser,
    routes::admin::{InventoryAdjustRequest, LowStockQuery, UpdateOrderStatusRequest},
    routes::params::Pagination,
    services::{admin_service, cart_service, order_service},
    state::AppState,
};
use rust_decimal::Decimal;
use uuid::Uuid;

// Integration flow: user builds a cart, applies a coupon, checks out and
// pays; admin updates the order status and sees the stock drop.
#[tokio::test]
async fn cart_coupon_checkout_and_admin_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;

    let product_id = create_product(&state, "Gold Hoop Earrings", 900, Some(1800), 10).await?;
    create_coupon(&state, "SAVE10", 10, None).await?;
    create_coupon(&state, "BIGSPEND", 10, Some(5000)).await?;

    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // Add two units; totals come from live catalog prices.
    let cart_resp = cart_service::add_line(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id,
            quantity: 2,
        },
    )
    .await?;
    let view = cart_resp.data.unwrap();
    assert_eq!(view.totals.subtotal, Decimal::from(1800));
    assert_eq!(view.totals.total_items, 2);

    // An accumulating add that would overflow the line quantity is refused.
    let overflow = cart_service::add_line(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id,
            quantity: i32::MAX,
        },
    )
    .await;
    assert!(matches!(overflow, Err(AppError::BadRequest(_))));

    // Updating a line to zero removes it outright.
    let view = cart_service::update_line(
        &state,
        &auth_user,
        product_id,
        UpdateCartLineRequest { quantity: 0 },
    )
    .await?
    .data
    .unwrap();
    assert!(view.items.is_empty());
    assert_eq!(view.totals.total_items, 0);
    assert_eq!(view.totals.total, Decimal::ZERO);

    // Removing the now-absent line is a 404, not a no-op.
    let missing = cart_service::remove_line(&state, &auth_user, product_id).await;
    assert!(matches!(missing, Err(AppError::LineNotFound)));

    // Rebuild the cart for the coupon flow.
    cart_service::add_line(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id,
            quantity: 2,
        },
    )
    .await?;

    // A coupon under its minimum is rejected and leaves the cart untouched.
    let rejected = cart_service::apply_coupon(
        &state,
        &auth_user,
        ApplyCouponRequest {
            code: "BIGSPEND".into(),
        },
    )
    .await;
    assert!(matches!(rejected, Err(AppError::MinimumOrderNotMet)));
    let view = cart_service::get_cart(&state, &auth_user).await?.data.unwrap();
    assert!(view.coupon.is_none());
    assert_eq!(view.totals.total, Decimal::from(1800));

    // SAVE10 takes 10% off the subtotal.
    let view = cart_service::apply_coupon(
        &state,
        &auth_user,
        ApplyCouponRequest {
            code: "save10".into(),
        },
    )
    .await?
    .data
    .unwrap();
    let applied = view.coupon.expect("coupon should be attached");
    assert_eq!(applied.code, "SAVE10");
    assert_eq!(view.totals.coupon_discount, Decimal::from(180));
    assert_eq!(view.totals.total, Decimal::from(1620));

    // Checkout snapshots the priced cart into an order.
    let checkout_resp = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            shipping_address: "12 Jewel Lane".into(),
            payment_method: "cash".into(),
        },
    )
    .await?;
    let placed = checkout_resp.data.unwrap();
    assert_eq!(placed.order.subtotal, Decimal::from(1800));
    assert_eq!(placed.order.coupon_discount, Decimal::from(180));
    assert_eq!(placed.order.total_amount, Decimal::from(1620));
    assert_eq!(placed.order.coupon_code.as_deref(), Some("SAVE10"));
    assert_eq!(placed.items.len(), 1);

    // The cart is emptied by checkout.
    let view = cart_service::get_cart(&state, &auth_user).await?.data.unwrap();
    assert!(view.items.is_empty());
    assert!(view.coupon.is_none());

    // Pay
    let pay_resp = order_service::pay_order(
        &state,
        &auth_user,
        placed.order.id,
        PayOrderRequest {
            invoice_number: placed.order.invoice_number.clone(),
        },
    )
    .await?;
    let paid = pay_resp.data.unwrap();
    assert_eq!(paid.order.payment_status, "paid");

    // Admin updates status
    let updated = order_service_status(&state, &auth_admin, placed.order.id, "shipped").await?;
    assert_eq!(updated, "shipped");

    // Stock dropped to 8, so the product shows up under a threshold of 10.
    let low = admin_service::list_low_stock(
        &state,
        &auth_admin,
        LowStockQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            threshold: Some(10),
        },
    )
    .await?;
    assert!(
        low.data.unwrap().items.iter().any(|p| p.id == product_id),
        "expected product to appear in low-stock list"
    );

    // A cancelled order can no longer be paid.
    cart_service::add_line(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id,
            quantity: 1,
        },
    )
    .await?;
    let second = order_service::checkout(
        &state,
        &auth_user,
        CheckoutRequest {
            shipping_address: "12 Jewel Lane".into(),
            payment_method: "cash".into(),
        },
    )
    .await?
    .data
    .unwrap();
    let cancelled = order_service_status(&state, &auth_admin, second.order.id, "cancelled").await?;
    assert_eq!(cancelled, "cancelled");
    let pay_cancelled = order_service::pay_order(
        &state,
        &auth_user,
        second.order.id,
        PayOrderRequest {
            invoice_number: second.order.invoice_number.clone(),
        },
    )
    .await;
    assert!(matches!(pay_cancelled, Err(AppError::BadRequest(_))));

    // Inventory adjustments that would overflow the stock counter are refused.
    let adjust = admin_service::adjust_inventory(
        &state,
        &auth_admin,
        product_id,
        InventoryAdjustRequest { delta: i32::MAX },
    )
    .await;
    assert!(matches!(adjust, Err(AppError::BadRequest(_))));

    Ok(())
}

async fn order_service_status(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    status: &str,
) -> anyhow::Result<String> {
    let resp = admin_service::update_order_status(
        state,
        admin,
        id,
        UpdateOrderStatusRequest {
            status: status.into(),
        },
    )
    .await?;
    Ok(resp.data.unwrap().status)
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE coupon_redemptions, order_items, orders, cart_items, carts, \
         audit_logs, coupons, products, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        jwt_secret: "test-secret".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
    };

    Ok(AppState { pool, orm, config })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, password_hash, role) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(email)
        .bind("dummy")
        .bind(role)
        .execute(&state.pool)
        .await?;
    Ok(id)
}

async fn create_product(
    state: &AppState,
    name: &str,
    price: i64,
    original_price: Option<i64>,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, name, price, original_price, stock, category) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(name)
    .bind(Decimal::from(price))
    .bind(original_price.map(Decimal::from))
    .bind(stock)
    .bind("earrings")
    .execute(&state.pool)
    .await?;
    Ok(id)
}

async fn create_coupon(
    state: &AppState,
    code: &str,
    percent: i64,
    min_order: Option<i64>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO coupons (id, code, kind, value, min_order_value, valid_from, valid_until) \
         VALUES ($1, $2, 'percentage', $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(code)
    .bind(Decimal::from(percent))
    .bind(min_order.map(Decimal::from))
    .bind(now - Duration::days(1))
    .bind(now + Duration::days(30))
    .execute(&state.pool)
    .await?;
    Ok(id)
}
