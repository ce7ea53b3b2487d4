use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Product {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

/// Product row joined with its owner's public fields
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ProductWithOwner {
    #[sqlx(flatten)]
    pub product: Product,
    pub owner_first_name: Option<String>,
    pub owner_last_name: Option<String>,
    pub owner_email: Option<String>,
    pub owner_user_type: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ProductOwner {
    pub id: i32,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl ProductWithOwner {
    pub fn owner(&self) -> ProductOwner {
        ProductOwner {
            id: self.product.user_id,
            first_name: self.owner_first_name.clone(),
            last_name: self.owner_last_name.clone(),
            email: self.owner_email.clone(),
            role: self.owner_user_type.clone(),
        }
    }
}
