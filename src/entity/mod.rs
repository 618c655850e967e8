pub mod cart_items;
pub mod carts;
pub mod coupon_redemptions;
pub mod order_items;
pub mod orders;
pub mod products;

pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use coupon_redemptions::Entity as CouponRedemptions;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
