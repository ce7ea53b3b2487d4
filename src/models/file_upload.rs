use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct FileUpload {
    pub file_id: i32,
    pub project_id: Option<i32>,
    pub order_id: Option<i32>,
    pub filename: String,
    pub file_url: String,
    pub uploaded_at: NaiveDateTime,
}
