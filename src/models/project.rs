use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Project {
    pub project_id: i32,
    pub client_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub deadline: Option<NaiveDate>,
    pub price: Option<f64>,
    pub payment_status: String,
    pub delivery_status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}
