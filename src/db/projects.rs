use anyhow::Result;
use chrono::NaiveDate;

use super::Database;
use crate::models::Project;

/// Project fields; on update `None` keeps the stored value
#[derive(Debug, Default)]
pub struct ProjectChanges {
    pub client_id: Option<i32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub price: Option<f64>,
    pub payment_status: Option<String>,
    pub delivery_status: Option<String>,
}

impl Database {
    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at DESC")
            .fetch_all(self.get_pool())
            .await?;

        Ok(projects)
    }

    pub async fn get_projects_by_client(&self, client_id: i32) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE client_id = $1 ORDER BY created_at DESC",
        )
        .bind(client_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(projects)
    }

    pub async fn get_project(&self, id: i32) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE project_id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(project)
    }

    /// `client_id` and `title` must be present; unset statuses take their defaults
    pub async fn create_project(&self, project: &ProjectChanges) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects
                (client_id, title, description, category, status, deadline, price, payment_status, delivery_status)
            VALUES ($1, $2, $3, $4, COALESCE($5, 'Concept'), $6, $7, COALESCE($8, 'Unpaid'), COALESCE($9, 'Pending'))
            RETURNING *
            "#,
        )
        .bind(project.client_id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.category)
        .bind(&project.status)
        .bind(project.deadline)
        .bind(project.price)
        .bind(&project.payment_status)
        .bind(&project.delivery_status)
        .fetch_one(self.get_pool())
        .await?;

        Ok(project)
    }

    pub async fn update_project(&self, id: i32, changes: &ProjectChanges) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET client_id = COALESCE($1, client_id),
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                category = COALESCE($4, category),
                status = COALESCE($5, status),
                deadline = COALESCE($6, deadline),
                price = COALESCE($7, price),
                payment_status = COALESCE($8, payment_status),
                delivery_status = COALESCE($9, delivery_status),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE project_id = $10
            RETURNING *
            "#,
        )
        .bind(changes.client_id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.category)
        .bind(&changes.status)
        .bind(changes.deadline)
        .bind(changes.price)
        .bind(&changes.payment_status)
        .bind(&changes.delivery_status)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(project)
    }

    pub async fn delete_project(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE project_id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
