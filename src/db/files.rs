use anyhow::Result;
use sqlx::{Postgres, QueryBuilder};

use super::Database;
use crate::models::FileUpload;

/// File metadata; on update `None` keeps the stored value
#[derive(Debug, Default)]
pub struct FileChanges {
    pub filename: Option<String>,
    pub file_url: Option<String>,
    pub project_id: Option<i32>,
    pub order_id: Option<i32>,
}

impl Database {
    pub async fn get_files(&self, project_id: Option<i32>, order_id: Option<i32>) -> Result<Vec<FileUpload>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM file_uploads WHERE TRUE");

        if let Some(project_id) = project_id {
            query.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(order_id) = order_id {
            query.push(" AND order_id = ").push_bind(order_id);
        }
        query.push(" ORDER BY uploaded_at DESC");

        let files = query
            .build_query_as::<FileUpload>()
            .fetch_all(self.get_pool())
            .await?;

        Ok(files)
    }

    pub async fn get_file(&self, id: i32) -> Result<Option<FileUpload>> {
        let file = sqlx::query_as::<_, FileUpload>("SELECT * FROM file_uploads WHERE file_id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(file)
    }

    /// `filename` and `file_url` must be present
    pub async fn create_file(&self, file: &FileChanges) -> Result<FileUpload> {
        let file = sqlx::query_as::<_, FileUpload>(
            r#"
            INSERT INTO file_uploads (filename, file_url, project_id, order_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&file.filename)
        .bind(&file.file_url)
        .bind(file.project_id)
        .bind(file.order_id)
        .fetch_one(self.get_pool())
        .await?;

        Ok(file)
    }

    pub async fn update_file(&self, id: i32, changes: &FileChanges) -> Result<Option<FileUpload>> {
        let file = sqlx::query_as::<_, FileUpload>(
            r#"
            UPDATE file_uploads
            SET filename = COALESCE($1, filename),
                file_url = COALESCE($2, file_url),
                project_id = COALESCE($3, project_id),
                order_id = COALESCE($4, order_id)
            WHERE file_id = $5
            RETURNING *
            "#,
        )
        .bind(&changes.filename)
        .bind(&changes.file_url)
        .bind(changes.project_id)
        .bind(changes.order_id)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(file)
    }

    pub async fn delete_file(&self, id: i32) -> Result<Option<FileUpload>> {
        let file = sqlx::query_as::<_, FileUpload>("DELETE FROM file_uploads WHERE file_id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(file)
    }
}
