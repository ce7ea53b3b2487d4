use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Payment {
    pub payment_id: i32,
    pub order_id: i32,
    pub amount: f64,
    pub method: String,
    pub reference: Option<String>,
    pub paid_at: NaiveDateTime,
}
