use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use gemstore_api::{config::AppConfig, db::create_pool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@example.com", "admin12345", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "user@example.com", "user12345", "user").await?;
    seed_products(&pool).await?;
    seed_coupons(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(row.0)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products: Vec<(&str, &str, i64, Option<i64>, i32, &str)> = vec![
        (
            "Solitaire Diamond Ring",
            "0.5 carat solitaire on an 18k gold band",
            24999,
            None,
            12,
            "rings",
        ),
        (
            "Gold Hoop Earrings",
            "Classic 22k gold hoops",
            900,
            Some(1800),
            40,
            "earrings",
        ),
        (
            "Pearl Strand Necklace",
            "Freshwater pearls, 45cm strand",
            3200,
            None,
            25,
            "necklaces",
        ),
        (
            "Silver Charm Bracelet",
            "Sterling silver with three charms",
            1450,
            Some(1600),
            60,
            "bracelets",
        ),
    ];

    for (name, desc, price, original, stock, category) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, original_price, stock, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(Decimal::from(price))
        .bind(original.map(Decimal::from))
        .bind(stock)
        .bind(category)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_coupons(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let coupons: Vec<(&str, &str, i64, Option<i64>, Option<i64>, Vec<&str>)> = vec![
        ("SAVE10", "percentage", 10, None, None, vec![]),
        ("WELCOME500", "fixed", 500, Some(2000), None, vec![]),
        ("RINGLOVER", "percentage", 15, None, Some(5000), vec!["rings"]),
    ];

    for (code, kind, value, min_order, max_discount, categories) in coupons {
        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, kind, value, min_order_value, max_discount,
                valid_from, valid_until, applicable_categories
            )
            VALUES ($1, $2, $3::coupon_kind, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(kind)
        .bind(Decimal::from(value))
        .bind(min_order.map(Decimal::from))
        .bind(max_discount.map(Decimal::from))
        .bind(now - Duration::days(1))
        .bind(now + Duration::days(90))
        .bind(categories.iter().map(|c| c.to_string()).collect::<Vec<_>>())
        .execute(pool)
        .await?;
    }

    println!("Seeded coupons");
    Ok(())
}
