//! Product repository
//!
//! Database operations for products and their gallery images.
//!
//! Sizes are stored as a comma-wrapped list (`,S,M,L,`) so a single
//! `LIKE '%,M,%'` matches one size exactly on both SQLite and MySQL.

use super::{bind_args, like_pattern, SqlArg, WhereBuilder};
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{normalize_size, ListQuery, Product, ProductImage};
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

const PRODUCT_COLUMNS: &str = r#"
    p.id, p.name, p.slug, p.description, p.category_id, c.name AS category_name,
    p.team, p.brand, p.price, p.compare_at_price, p.stock, p.sizes,
    p.is_featured, p.is_active, p.rating, p.num_reviews, p.created_at, p.updated_at
"#;

const PRODUCT_FROM: &str = "products p LEFT JOIN categories c ON c.id = p.category_id";

const PRODUCT_SORTS: &[(&str, &str)] = &[
    ("id", "p.id"),
    ("name", "p.name"),
    ("price", "p.price"),
    ("stock", "p.stock"),
    ("rating", "p.rating"),
    ("num_reviews", "p.num_reviews"),
    ("created_at", "p.created_at"),
];

/// Product repository trait
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Create a new product (images are attached separately)
    async fn create(&self, product: &Product) -> Result<Product>;

    /// Get product by ID, with images
    async fn get_by_id(&self, id: i64) -> Result<Option<Product>>;

    /// Get product by slug, with images
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>>;

    /// List products with images.
    ///
    /// Filters: `q`, `category_id`, `category` (slug), `team`, `brand`, `size`,
    /// `min_price`, `max_price`, `featured`, `active`, `in_stock`, `id` list.
    async fn list(&self, query: &ListQuery) -> Result<(Vec<Product>, i64)>;

    /// Update a product's own columns
    async fn update(&self, product: &Product) -> Result<Product>;

    /// Delete a product (images and cart lines cascade)
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a slug is taken, optionally ignoring one product
    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Append an image to the gallery
    async fn add_image(&self, product_id: i64, url: &str, alt: Option<&str>) -> Result<ProductImage>;

    /// Remove an image; false if it doesn't belong to the product
    async fn delete_image(&self, product_id: i64, image_id: i64) -> Result<bool>;

    /// Gallery images in display order
    async fn list_images(&self, product_id: i64) -> Result<Vec<ProductImage>>;

    /// Store the aggregated review rating
    async fn set_rating(&self, id: i64, rating: f64, num_reviews: i64) -> Result<()>;

    /// Count all products
    async fn count(&self) -> Result<i64>;

    /// Active products with stock at or below the threshold, lowest first
    async fn list_low_stock(&self, threshold: i64, limit: i64) -> Result<Vec<Product>>;
}

/// SQLx-based product repository implementation
pub struct SqlxProductRepository {
    pool: DynDatabasePool,
}

impl SqlxProductRepository {
    /// Create a new SQLx product repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProductRepository> {
        Arc::new(Self::new(pool))
    }

    /// Images for several products, grouped by product ID
    async fn images_for(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<ProductImage>>> {
        let mut grouped: HashMap<i64, Vec<ProductImage>> = HashMap::new();
        if ids.is_empty() {
            return Ok(grouped);
        }

        let mut filters = WhereBuilder::new();
        filters.push_in("product_id", ids);
        let sql = format!(
            "SELECT id, product_id, url, alt, sort_order, created_at FROM product_images{} ORDER BY sort_order ASC, id ASC",
            filters.sql()
        );

        let images = with_backend!(self.pool, db => {
            bind_args!(sqlx::query_as::<_, ProductImage>(&sql), filters.args())
                .fetch_all(db)
                .await
        })
        .context("Failed to load product images")?;

        for image in images {
            grouped.entry(image.product_id).or_default().push(image);
        }
        Ok(grouped)
    }

    async fn with_images(&self, mut products: Vec<Product>) -> Result<Vec<Product>> {
        let ids: Vec<i64> = products.iter().map(|p| p.id).collect();
        let mut images = self.images_for(&ids).await?;
        for product in &mut products {
            product.images = images.remove(&product.id).unwrap_or_default();
        }
        Ok(products)
    }

    async fn fetch_one_where(&self, clause: &str, arg: SqlArg) -> Result<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            PRODUCT_COLUMNS, PRODUCT_FROM, clause
        );
        let args = [arg];
        let row = with_backend!(self.pool, db => {
            bind_args!(sqlx::query_as::<_, ProductRow>(&sql), &args)
                .fetch_optional(db)
                .await
        })
        .context("Failed to get product")?;

        match row {
            Some(row) => {
                let products = self.with_images(vec![row.into()]).await?;
                Ok(products.into_iter().next())
            }
            None => Ok(None),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    slug: String,
    description: String,
    category_id: Option<i64>,
    category_name: Option<String>,
    team: Option<String>,
    brand: Option<String>,
    price: i64,
    compare_at_price: Option<i64>,
    stock: i64,
    sizes: String,
    is_featured: bool,
    is_active: bool,
    rating: f64,
    num_reviews: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            category_id: row.category_id,
            category_name: row.category_name,
            team: row.team,
            brand: row.brand,
            price: row.price,
            compare_at_price: row.compare_at_price,
            stock: row.stock,
            sizes: decode_sizes(&row.sizes),
            is_featured: row.is_featured,
            is_active: row.is_active,
            rating: row.rating,
            num_reviews: row.num_reviews,
            images: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn encode_sizes(sizes: &[String]) -> String {
    let sizes: Vec<String> = sizes
        .iter()
        .map(|s| normalize_size(s))
        .filter(|s| !s.is_empty())
        .collect();
    if sizes.is_empty() {
        String::new()
    } else {
        format!(",{},", sizes.join(","))
    }
}

fn decode_sizes(stored: &str) -> Vec<String> {
    stored
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn list_filters(query: &ListQuery) -> WhereBuilder {
    let mut filters = WhereBuilder::new();

    let ids = query.filter_ids();
    if !ids.is_empty() {
        filters.push_in("p.id", &ids);
    }
    if let Some(q) = query.filter_str("q") {
        let pattern = like_pattern(&q);
        filters.push(
            "(p.name LIKE ? ESCAPE '!' OR p.team LIKE ? ESCAPE '!' OR p.brand LIKE ? ESCAPE '!')",
            [
                SqlArg::Text(pattern.clone()),
                SqlArg::Text(pattern.clone()),
                SqlArg::Text(pattern),
            ],
        );
    }
    if let Some(category_id) = query.filter_i64("category_id") {
        filters.push("p.category_id = ?", [SqlArg::Int(category_id)]);
    }
    if let Some(slug) = query.filter_str("category") {
        filters.push("c.slug = ?", [SqlArg::Text(slug)]);
    }
    if let Some(team) = query.filter_str("team") {
        filters.push("p.team = ?", [SqlArg::Text(team)]);
    }
    if let Some(brand) = query.filter_str("brand") {
        filters.push("p.brand = ?", [SqlArg::Text(brand)]);
    }
    if let Some(size) = query.filter_str("size") {
        filters.push(
            "p.sizes LIKE ? ESCAPE '!'",
            [SqlArg::Text(like_pattern(&format!(",{},", normalize_size(&size))))],
        );
    }
    if let Some(min) = query.filter_i64("min_price") {
        filters.push("p.price >= ?", [SqlArg::Int(min)]);
    }
    if let Some(max) = query.filter_i64("max_price") {
        filters.push("p.price <= ?", [SqlArg::Int(max)]);
    }
    if let Some(featured) = query.filter_bool("featured") {
        filters.push("p.is_featured = ?", [SqlArg::Bool(featured)]);
    }
    if let Some(active) = query.filter_bool("active") {
        filters.push("p.is_active = ?", [SqlArg::Bool(active)]);
    }
    if let Some(in_stock) = query.filter_bool("in_stock") {
        filters.push(if in_stock { "p.stock > 0" } else { "p.stock <= 0" }, []);
    }

    filters
}

#[async_trait]
impl ProductRepository for SqlxProductRepository {
    async fn create(&self, product: &Product) -> Result<Product> {
        let now = Utc::now();
        let id = with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                INSERT INTO products (name, slug, description, category_id, team, brand, price,
                    compare_at_price, stock, sizes, is_featured, is_active, rating, num_reviews,
                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
                "#,
            )
            .bind(&product.name)
            .bind(&product.slug)
            .bind(&product.description)
            .bind(product.category_id)
            .bind(&product.team)
            .bind(&product.brand)
            .bind(product.price)
            .bind(product.compare_at_price)
            .bind(product.stock)
            .bind(encode_sizes(&product.sizes))
            .bind(product.is_featured)
            .bind(product.is_active)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to create product")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Product not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Product>> {
        self.fetch_one_where("p.id = ?", SqlArg::Int(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        self.fetch_one_where("p.slug = ?", SqlArg::Text(slug.to_string()))
            .await
    }

    async fn list(&self, query: &ListQuery) -> Result<(Vec<Product>, i64)> {
        let filters = list_filters(query);
        let order_by = query.order_by(PRODUCT_SORTS, "p.created_at DESC");

        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}, p.id DESC LIMIT ? OFFSET ?",
            PRODUCT_COLUMNS,
            PRODUCT_FROM,
            filters.sql(),
            order_by
        );
        let count_sql = format!("SELECT COUNT(*) FROM {}{}", PRODUCT_FROM, filters.sql());

        let (rows, total) = with_backend!(self.pool, db => {
            let rows = bind_args!(sqlx::query_as::<_, ProductRow>(&sql), filters.args())
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(db)
                .await;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), filters.args())
                .fetch_one(db)
                .await;
            (rows, total)
        });

        let products: Vec<Product> = rows
            .context("Failed to list products")?
            .into_iter()
            .map(Product::from)
            .collect();
        let total = total.context("Failed to count products")?;

        Ok((self.with_images(products).await?, total))
    }

    async fn update(&self, product: &Product) -> Result<Product> {
        let now = Utc::now();
        with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                UPDATE products
                SET name = ?, slug = ?, description = ?, category_id = ?, team = ?, brand = ?,
                    price = ?, compare_at_price = ?, stock = ?, sizes = ?, is_featured = ?,
                    is_active = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&product.name)
            .bind(&product.slug)
            .bind(&product.description)
            .bind(product.category_id)
            .bind(&product.team)
            .bind(&product.brand)
            .bind(product.price)
            .bind(product.compare_at_price)
            .bind(product.stock)
            .bind(encode_sizes(&product.sizes))
            .bind(product.is_featured)
            .bind(product.is_active)
            .bind(now)
            .bind(product.id)
            .execute(db)
            .await
            .map(|_| ())
        })
        .context("Failed to update product")?;

        self.get_by_id(product.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Product not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM products WHERE id = ?").bind(id).execute(db).await.map(|_| ())
        })
        .context("Failed to delete product")?;
        Ok(())
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE slug = ? AND id <> ?")
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(db)
                .await
        })
        .context("Failed to check product slug")?;
        Ok(count > 0)
    }

    async fn add_image(&self, product_id: i64, url: &str, alt: Option<&str>) -> Result<ProductImage> {
        let last = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>(
                "SELECT sort_order FROM product_images WHERE product_id = ? ORDER BY sort_order DESC LIMIT 1",
            )
            .bind(product_id)
            .fetch_optional(db)
            .await
        })
        .context("Failed to read image order")?;
        let sort_order = last.map(|n| n + 1).unwrap_or(0);

        let now = Utc::now();
        let id = with_backend!(self.pool, db => {
            sqlx::query(
                "INSERT INTO product_images (product_id, url, alt, sort_order, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(product_id)
            .bind(url)
            .bind(alt)
            .bind(sort_order)
            .bind(now)
            .execute(db)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to add product image")?;

        Ok(ProductImage {
            id,
            product_id,
            url: url.to_string(),
            alt: alt.map(str::to_string),
            sort_order,
            created_at: now,
        })
    }

    async fn delete_image(&self, product_id: i64, image_id: i64) -> Result<bool> {
        let affected = with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM product_images WHERE id = ? AND product_id = ?")
                .bind(image_id)
                .bind(product_id)
                .execute(db)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete product image")?;
        Ok(affected > 0)
    }

    async fn list_images(&self, product_id: i64) -> Result<Vec<ProductImage>> {
        let mut images = self.images_for(&[product_id]).await?;
        Ok(images.remove(&product_id).unwrap_or_default())
    }

    async fn set_rating(&self, id: i64, rating: f64, num_reviews: i64) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("UPDATE products SET rating = ?, num_reviews = ? WHERE id = ?")
                .bind(rating)
                .bind(num_reviews)
                .bind(id)
                .execute(db)
                .await
                .map(|_| ())
        })
        .context("Failed to update product rating")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products").fetch_one(db).await
        })
        .context("Failed to count products")?;
        Ok(count)
    }

    async fn list_low_stock(&self, threshold: i64, limit: i64) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE p.is_active = ? AND p.stock <= ? ORDER BY p.stock ASC, p.id ASC LIMIT ?",
            PRODUCT_COLUMNS, PRODUCT_FROM
        );
        let rows = with_backend!(self.pool, db => {
            sqlx::query_as::<_, ProductRow>(&sql)
                .bind(true)
                .bind(threshold)
                .bind(limit)
                .fetch_all(db)
                .await
        })
        .context("Failed to list low-stock products")?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}
