use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use gemstore_api::models::{Coupon, CouponKind};
use gemstore_api::pricing::{self, CouponRejection, CouponUsage, PricedLine};

fn line(price: i64, quantity: i32) -> PricedLine {
    PricedLine {
        product_id: Uuid::new_v4(),
        quantity,
        unit_price: Decimal::from(price),
        original_price: None,
        category: None,
        available: true,
    }
}

fn sale_line(price: i64, original: i64, quantity: i32) -> PricedLine {
    PricedLine {
        original_price: Some(Decimal::from(original)),
        ..line(price, quantity)
    }
}

fn categorized_line(price: i64, quantity: i32, category: &str) -> PricedLine {
    PricedLine {
        category: Some(category.to_string()),
        ..line(price, quantity)
    }
}

fn coupon(kind: CouponKind, value: i64) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4(),
        code: "TEST".to_string(),
        kind,
        value: Decimal::from(value),
        min_order_value: None,
        max_discount: None,
        valid_from: now - Duration::days(1),
        valid_until: now + Duration::days(1),
        usage_limit: None,
        user_usage_limit: None,
        applicable_categories: Vec::new(),
        applicable_products: Vec::new(),
        is_active: true,
        is_public: true,
        created_at: now,
    }
}

#[test]
fn sale_line_reports_informational_discount_without_double_counting() {
    let lines = vec![sale_line(900, 1800, 1)];
    let totals = pricing::compose_totals(&lines, Decimal::ZERO);

    assert_eq!(totals.subtotal, Decimal::from(900));
    assert_eq!(totals.discount, Decimal::from(900));
    assert_eq!(totals.coupon_discount, Decimal::ZERO);
    // The sale delta is informational only; the payable total stays at the
    // current-price subtotal.
    assert_eq!(totals.total, Decimal::from(900));
    assert_eq!(totals.total_items, 1);
}

#[test]
fn percentage_coupon_discounts_ten_percent() {
    let lines = vec![sale_line(900, 1800, 1)];
    let c = coupon(CouponKind::Percentage, 10);

    let discount = pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now())
        .expect("coupon should validate");
    assert_eq!(discount, Decimal::from(90));

    let totals = pricing::compose_totals(&lines, discount);
    assert_eq!(totals.coupon_discount, Decimal::from(90));
    assert_eq!(totals.total, Decimal::from(810));
}

#[test]
fn minimum_order_not_met_rejects_without_touching_cart() {
    let lines = vec![line(900, 1)];
    let mut c = coupon(CouponKind::Percentage, 10);
    c.min_order_value = Some(Decimal::from(1000));

    let result = pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now());
    assert_eq!(result, Err(CouponRejection::MinimumOrderNotMet));
}

#[test]
fn multi_line_subtotal_sums_line_totals() {
    let lines = vec![line(500, 2), line(300, 3)];
    let totals = pricing::compose_totals(&lines, Decimal::ZERO);

    assert_eq!(totals.subtotal, Decimal::from(1900));
    assert_eq!(totals.total_items, 5);
}

#[test]
fn fixed_coupon_clamps_to_subtotal() {
    let lines = vec![line(900, 1)];
    let c = coupon(CouponKind::Fixed, 5000);

    let discount =
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now()).unwrap();
    assert_eq!(discount, Decimal::from(900));

    let totals = pricing::compose_totals(&lines, discount);
    assert_eq!(totals.total, Decimal::ZERO);
}

#[test]
fn total_is_never_negative() {
    let lines = vec![line(100, 1)];
    // Even a bogus oversized discount cannot push the total below zero.
    let totals = pricing::compose_totals(&lines, Decimal::from(10_000));
    assert!(totals.total >= Decimal::ZERO);
    assert!(totals.coupon_discount <= totals.subtotal);
}

#[test]
fn percentage_discount_respects_max_discount_cap() {
    let lines = vec![line(10_000, 1)];
    let mut c = coupon(CouponKind::Percentage, 50);
    c.max_discount = Some(Decimal::from(1000));

    let discount =
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now()).unwrap();
    assert_eq!(discount, Decimal::from(1000));
}

#[test]
fn validity_window_is_inclusive_at_both_bounds() {
    let lines = vec![line(500, 1)];
    let c = coupon(CouponKind::Percentage, 10);

    assert!(pricing::validate_coupon(&c, &lines, CouponUsage::default(), c.valid_from).is_ok());
    assert!(pricing::validate_coupon(&c, &lines, CouponUsage::default(), c.valid_until).is_ok());

    let before = c.valid_from - Duration::seconds(1);
    assert_eq!(
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), before),
        Err(CouponRejection::NotYetValid)
    );

    let after = c.valid_until + Duration::seconds(1);
    assert_eq!(
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), after),
        Err(CouponRejection::Expired)
    );
}

#[test]
fn inactive_coupon_is_rejected_before_anything_else() {
    let lines = vec![line(500, 1)];
    let mut c = coupon(CouponKind::Percentage, 10);
    c.is_active = false;

    assert_eq!(
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now()),
        Err(CouponRejection::Inactive)
    );
}

#[test]
fn usage_caps_are_enforced_globally_and_per_user() {
    let lines = vec![line(500, 1)];
    let mut c = coupon(CouponKind::Percentage, 10);
    c.usage_limit = Some(5);
    c.user_usage_limit = Some(2);

    let at_global_cap = CouponUsage { total: 5, by_user: 0 };
    assert_eq!(
        pricing::validate_coupon(&c, &lines, at_global_cap, Utc::now()),
        Err(CouponRejection::UsageLimitReached)
    );

    let at_user_cap = CouponUsage { total: 3, by_user: 2 };
    assert_eq!(
        pricing::validate_coupon(&c, &lines, at_user_cap, Utc::now()),
        Err(CouponRejection::UsageLimitReached)
    );

    let under_caps = CouponUsage { total: 4, by_user: 1 };
    assert!(pricing::validate_coupon(&c, &lines, under_caps, Utc::now()).is_ok());
}

#[test]
fn restricted_coupon_discounts_only_the_eligible_subset() {
    let lines = vec![
        categorized_line(1000, 1, "rings"),
        categorized_line(500, 1, "earrings"),
    ];
    let mut c = coupon(CouponKind::Percentage, 10);
    c.applicable_categories = vec!["rings".to_string()];

    let discount =
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now()).unwrap();
    // 10% of the 1000 rings line, not of the 1500 cart.
    assert_eq!(discount, Decimal::from(100));
}

#[test]
fn product_allow_list_also_narrows_the_discount_base() {
    let favored = line(800, 1);
    let other = line(400, 1);
    let mut c = coupon(CouponKind::Fixed, 1000);
    c.applicable_products = vec![favored.product_id];

    let discount = pricing::validate_coupon(
        &c,
        &[favored.clone(), other],
        CouponUsage::default(),
        Utc::now(),
    )
    .unwrap();
    // Fixed discount clamps to the eligible line's worth.
    assert_eq!(discount, Decimal::from(800));
}

#[test]
fn restricted_coupon_with_no_matching_line_is_not_applicable() {
    let lines = vec![categorized_line(1000, 1, "necklaces")];
    let mut c = coupon(CouponKind::Percentage, 10);
    c.applicable_categories = vec!["rings".to_string()];

    assert_eq!(
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now()),
        Err(CouponRejection::NotApplicable)
    );
}

#[test]
fn unavailable_lines_are_excluded_from_every_total() {
    let mut gone = line(700, 2);
    gone.available = false;
    let lines = vec![line(300, 1), gone];

    let totals = pricing::compose_totals(&lines, Decimal::ZERO);
    assert_eq!(totals.subtotal, Decimal::from(300));
    assert_eq!(totals.total_items, 1);
}

#[test]
fn unavailable_lines_do_not_satisfy_coupon_restrictions() {
    let mut ring = categorized_line(1000, 1, "rings");
    ring.available = false;
    let lines = vec![ring, categorized_line(500, 1, "earrings")];
    let mut c = coupon(CouponKind::Percentage, 10);
    c.applicable_categories = vec!["rings".to_string()];

    assert_eq!(
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now()),
        Err(CouponRejection::NotApplicable)
    );
}

#[test]
fn validation_and_composition_are_deterministic() {
    let lines = vec![sale_line(900, 1800, 1), line(550, 3)];
    let c = coupon(CouponKind::Percentage, 10);
    let now = Utc::now();

    let first = pricing::validate_coupon(&c, &lines, CouponUsage::default(), now).unwrap();
    let second = pricing::validate_coupon(&c, &lines, CouponUsage::default(), now).unwrap();
    assert_eq!(first, second);

    let totals_a = pricing::compose_totals(&lines, first);
    let totals_b = pricing::compose_totals(&lines, second);
    assert_eq!(totals_a, totals_b);
}

#[test]
fn rounding_happens_once_on_the_composed_fields() {
    // 10% of 999.95 is 99.995; half-up rounding lands on 100.00.
    let lines = vec![PricedLine {
        unit_price: Decimal::new(99_995, 2),
        ..line(0, 1)
    }];
    let c = coupon(CouponKind::Percentage, 10);

    let discount =
        pricing::validate_coupon(&c, &lines, CouponUsage::default(), Utc::now()).unwrap();
    let totals = pricing::compose_totals(&lines, discount);

    assert_eq!(totals.coupon_discount, Decimal::new(10_000, 2));
    // The total is rounded from the exact 899.955, not derived from the
    // rounded discount.
    assert_eq!(totals.total, Decimal::new(89_996, 2));
}
