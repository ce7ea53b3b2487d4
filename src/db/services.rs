use anyhow::Result;

use super::Database;
use crate::models::Service;

/// Service fields; on update `None` keeps the stored value
#[derive(Debug, Default)]
pub struct ServiceChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
}

impl Database {
    pub async fn get_services(&self) -> Result<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY name ASC")
            .fetch_all(self.get_pool())
            .await?;

        Ok(services)
    }

    pub async fn get_service(&self, id: i32) -> Result<Option<Service>> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE service_id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(service)
    }

    /// `name` must be present
    pub async fn create_service(&self, service: &ServiceChanges) -> Result<Service> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (name, description, price, image_url)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.price)
        .bind(&service.image_url)
        .fetch_one(self.get_pool())
        .await?;

        Ok(service)
    }

    pub async fn update_service(&self, id: i32, changes: &ServiceChanges) -> Result<Option<Service>> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            UPDATE services
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                price = COALESCE($3, price),
                image_url = COALESCE($4, image_url),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE service_id = $5
            RETURNING *
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.price)
        .bind(&changes.image_url)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(service)
    }

    pub async fn delete_service(&self, id: i32) -> Result<Option<Service>> {
        let service = sqlx::query_as::<_, Service>("DELETE FROM services WHERE service_id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(service)
    }
}
