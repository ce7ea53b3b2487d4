use anyhow::Result;

use super::Database;
use crate::models::{Product, ProductWithOwner};

const PRODUCT_WITH_OWNER: &str = r#"
    SELECT p.*,
           u.first_name AS owner_first_name,
           u.last_name AS owner_last_name,
           u.email AS owner_email,
           u.user_type AS owner_user_type
    FROM products p
    LEFT JOIN users u ON u.user_id = p.user_id
"#;

/// Product fields; on update `None` keeps the stored value
#[derive(Debug, Default)]
pub struct ProductChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
}

impl Database {
    pub async fn count_products(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(self.get_pool())
            .await?;

        Ok(count)
    }

    /// One page of products with their owners, oldest first
    pub async fn get_products_page(&self, limit: i64, offset: i64) -> Result<Vec<ProductWithOwner>> {
        let products = sqlx::query_as::<_, ProductWithOwner>(&format!(
            "{PRODUCT_WITH_OWNER} ORDER BY p.id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.get_pool())
        .await?;

        Ok(products)
    }

    pub async fn get_product_with_owner(&self, id: i32) -> Result<Option<ProductWithOwner>> {
        let product = sqlx::query_as::<_, ProductWithOwner>(&format!("{PRODUCT_WITH_OWNER} WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(product)
    }

    pub async fn get_product(&self, id: i32) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(product)
    }

    pub async fn get_products_by_ids(&self, ids: &[i32]) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(self.get_pool())
            .await?;

        Ok(products)
    }

    /// `title` must be present
    pub async fn create_product(&self, owner_id: i32, product: &ProductChanges) -> Result<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (user_id, title, description, category, price, image)
            VALUES ($1, $2, $3, $4, COALESCE($5, 0), $6)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price)
        .bind(&product.image)
        .fetch_one(self.get_pool())
        .await?;

        Ok(product)
    }

    pub async fn update_product(&self, id: i32, changes: &ProductChanges) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET title = COALESCE($1, title),
                description = COALESCE($2, description),
                category = COALESCE($3, category),
                price = COALESCE($4, price),
                image = COALESCE($5, image),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $6
            RETURNING *
            "#,
        )
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.category)
        .bind(changes.price)
        .bind(&changes.image)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(product)
    }

    /// Returns the deleted row so its stored image can be removed
    pub async fn delete_product(&self, id: i32) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("DELETE FROM products WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(product)
    }
}
