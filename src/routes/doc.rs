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
        cart::{AddToCartRequest, AppliedCouponDto, ApplyCouponRequest, CartLineDto, CartView, UpdateCartLineRequest},
        coupons::{CouponList, CreateCouponRequest, UpdateCouponRequest},
        orders::{CheckoutRequest, OrderList, OrderWithItems, PayOrderRequest},
        products,
    },
    models::{Coupon, CouponKind, Order, OrderItem, Product, User},
    pricing::CartTotals,
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, coupons, health, orders, params, products as product_routes},
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
        auth::login,
        auth::register,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_line,
        cart::remove_from_cart,
        cart::clear_cart,
        cart::apply_coupon,
        cart::remove_coupon,
        coupons::list_coupons,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        orders::list_orders,
        orders::checkout,
        orders::pay_order,
        orders::get_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_coupons,
        admin::create_coupon,
        admin::update_coupon,
        admin::delete_coupon
    ),
    components(
        schemas(
            User,
            Product,
            Coupon,
            CouponKind,
            Order,
            OrderItem,
            CartView,
            CartLineDto,
            CartTotals,
            AppliedCouponDto,
            AddToCartRequest,
            UpdateCartLineRequest,
            ApplyCouponRequest,
            CouponList,
            CreateCouponRequest,
            UpdateCouponRequest,
            CheckoutRequest,
            PayOrderRequest,
            OrderList,
            OrderWithItems,
            admin::ProductList,
            admin::UpdateOrderStatusRequest,
            admin::InventoryAdjustRequest,
            admin::LowStockQuery,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            products::ProductList,
            Meta,
            ApiResponse<Product>,
            ApiResponse<CartView>,
            ApiResponse<Coupon>,
            ApiResponse<CouponList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<products::ProductList>,
            ApiResponse<admin::ProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart and coupon endpoints"),
        (name = "Coupons", description = "Public coupon listing"),
        (name = "Orders", description = "Checkout and order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
