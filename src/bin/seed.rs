use std::collections::HashMap;

use anyhow::Context;
use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use storefront_api::db::create_pool;
use uuid::Uuid;

const GENDERS: &[(&str, &str)] = &[("Men", "men"), ("Women", "women"), ("Unisex", "unisex")];

const COLORS: &[(&str, &str, &str)] = &[
    ("Black", "black", "#000000"),
    ("White", "white", "#FFFFFF"),
    ("Red", "red", "#FF0000"),
    ("Blue", "blue", "#0066CC"),
    ("Gray", "gray", "#808080"),
    ("Green", "green", "#00CC00"),
];

const SIZES: &[(&str, &str, i32)] = &[
    ("7", "7", 1),
    ("7.5", "7-5", 2),
    ("8", "8", 3),
    ("8.5", "8-5", 4),
    ("9", "9", 5),
    ("9.5", "9-5", 6),
    ("10", "10", 7),
    ("10.5", "10-5", 8),
    ("11", "11", 9),
    ("12", "12", 10),
];

const CATEGORIES: &[(&str, &str)] = &[
    ("Running", "running"),
    ("Lifestyle", "lifestyle"),
    ("Skateboarding", "skateboarding"),
    ("Basketball", "basketball"),
];

const BRANDS: &[(&str, &str)] = &[("Nike", "nike"), ("Trailhead", "trailhead")];

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    category: &'static str,
    gender: &'static str,
    brand: &'static str,
    base_price: i64,
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        name: "Air Max 90",
        description: "Classic running shoe with visible cushioning and a waffle outsole.",
        category: "running",
        gender: "men",
        brand: "nike",
        base_price: 13000,
    },
    SeedProduct {
        name: "Air Force 1",
        description: "Hoops icon with a rubber cupsole for everyday wear.",
        category: "lifestyle",
        gender: "unisex",
        brand: "nike",
        base_price: 11000,
    },
    SeedProduct {
        name: "Pegasus Trail",
        description: "Responsive daily trainer with a grippy outsole for mixed terrain.",
        category: "running",
        gender: "women",
        brand: "trailhead",
        base_price: 14000,
    },
    SeedProduct {
        name: "Blazer Mid",
        description: "Vintage basketball silhouette with a suede upper.",
        category: "lifestyle",
        gender: "women",
        brand: "nike",
        base_price: 10500,
    },
    SeedProduct {
        name: "SB Dunk Low",
        description: "Padded collar and cushioned insole built for skating.",
        category: "skateboarding",
        gender: "men",
        brand: "nike",
        base_price: 11500,
    },
    SeedProduct {
        name: "Court Vision",
        description: "Low-top court shoe with a durable leather upper.",
        category: "basketball",
        gender: "unisex",
        brand: "trailhead",
        base_price: 9000,
    },
];

const IMAGES: &[&str] = &[
    "shoe-1.jpg",
    "shoe-2.webp",
    "shoe-3.webp",
    "shoe-4.webp",
    "shoe-5.avif",
    "shoe-6.avif",
    "shoe-7.avif",
    "shoe-8.avif",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

    let pool = create_pool(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "Shopper", "user@example.com", "user123", "user").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role, name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(id)
}

/// Upsert a slug-keyed lookup row and return its id.
async fn upsert_lookup(
    pool: &sqlx::PgPool,
    sql: &str,
    label: &str,
    slug: &str,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(sql)
        .bind(label)
        .bind(slug)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let mut genders = HashMap::new();
    for (label, slug) in GENDERS {
        let sql = "INSERT INTO genders (label, slug) VALUES ($1, $2) \
                   ON CONFLICT (slug) DO UPDATE SET label = EXCLUDED.label RETURNING id";
        genders.insert(*slug, upsert_lookup(pool, sql, label, slug).await?);
    }

    let mut brands = HashMap::new();
    for (name, slug) in BRANDS {
        let sql = "INSERT INTO brands (name, slug) VALUES ($1, $2) \
                   ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name RETURNING id";
        brands.insert(*slug, upsert_lookup(pool, sql, name, slug).await?);
    }

    let mut categories = HashMap::new();
    for (name, slug) in CATEGORIES {
        let sql = "INSERT INTO categories (name, slug) VALUES ($1, $2) \
                   ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name RETURNING id";
        categories.insert(*slug, upsert_lookup(pool, sql, name, slug).await?);
    }

    let mut colors = Vec::with_capacity(COLORS.len());
    for (name, slug, hex) in COLORS {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO colors (name, slug, hex_code) VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO UPDATE SET hex_code = EXCLUDED.hex_code RETURNING id",
        )
        .bind(name)
        .bind(slug)
        .bind(hex)
        .fetch_one(pool)
        .await?;
        colors.push((id, *slug));
    }

    let mut sizes = Vec::with_capacity(SIZES.len());
    for (name, slug, sort_order) in SIZES {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO sizes (name, slug, sort_order) VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO UPDATE SET sort_order = EXCLUDED.sort_order RETURNING id",
        )
        .bind(name)
        .bind(slug)
        .bind(sort_order)
        .fetch_one(pool)
        .await?;
        sizes.push((id, *slug));
    }
    println!("Seeded lookups");

    for (idx, product) in PRODUCTS.iter().enumerate() {
        let lookup = |map: &HashMap<&str, Uuid>, key: &str| {
            map.get(key)
                .copied()
                .with_context(|| format!("unknown lookup {key} for {}", product.name))
        };

        let (product_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products (name, description, category_id, gender_id, brand_id, is_published)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description, updated_at = now()
            RETURNING id
            "#,
        )
        .bind(product.name)
        .bind(product.description)
        .bind(lookup(&categories, product.category)?)
        .bind(lookup(&genders, product.gender)?)
        .bind(lookup(&brands, product.brand)?)
        .fetch_one(pool)
        .await?;

        // Two colors and four sizes per product, rotated so facets overlap.
        let product_colors = [colors[idx % colors.len()], colors[(idx + 1) % colors.len()]];
        let product_sizes: Vec<_> = (0..4).map(|i| sizes[(idx + i * 2) % sizes.len()]).collect();

        let mut first_variant = None;
        let mut color_variants = Vec::new();
        for (color_idx, (color_id, color_slug)) in product_colors.iter().enumerate() {
            for (size_idx, (size_id, size_slug)) in product_sizes.iter().enumerate() {
                let price = product.base_price + (size_idx as i64) * 500;
                let sale_price = (color_idx == 1).then(|| price * 8 / 10);
                let sku = format!(
                    "{}-{}-{}",
                    product.name.replace(' ', "-").to_uppercase(),
                    color_slug,
                    size_slug
                );

                let (variant_id,): (Uuid,) = sqlx::query_as(
                    r#"
                    INSERT INTO product_variants (product_id, sku, price, sale_price, color_id, size_id, in_stock)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (sku) DO UPDATE SET price = EXCLUDED.price, sale_price = EXCLUDED.sale_price
                    RETURNING id
                    "#,
                )
                .bind(product_id)
                .bind(&sku)
                .bind(price)
                .bind(sale_price)
                .bind(color_id)
                .bind(size_id)
                .bind(25_i32)
                .fetch_one(pool)
                .await?;

                first_variant.get_or_insert(variant_id);
                if size_idx == 0 {
                    color_variants.push(variant_id);
                }
            }
        }

        sqlx::query("DELETE FROM product_images WHERE product_id = $1")
            .bind(product_id)
            .execute(pool)
            .await?;
        for (color_idx, variant_id) in color_variants.iter().enumerate() {
            for sort_order in 0..2_i32 {
                let image = IMAGES[(idx * 2 + color_idx + sort_order as usize) % IMAGES.len()];
                sqlx::query(
                    r#"
                    INSERT INTO product_images (product_id, variant_id, url, sort_order, is_primary)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(product_id)
                .bind(variant_id)
                .bind(format!("/shoes/{image}"))
                .bind(sort_order)
                .bind(color_idx == 0 && sort_order == 0)
                .execute(pool)
                .await?;
            }
        }

        sqlx::query("UPDATE products SET default_variant_id = $1 WHERE id = $2")
            .bind(first_variant)
            .bind(product_id)
            .execute(pool)
            .await?;

        println!("  Seeded {}", product.name);
    }

    println!("Seeded {} products", PRODUCTS.len());
    Ok(())
}
