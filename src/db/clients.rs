use anyhow::Result;

use super::Database;
use crate::models::Client;

/// Client fields; on update `None` keeps the stored value
#[derive(Debug, Default)]
pub struct ClientChanges {
    pub company_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
}

impl Database {
    pub async fn get_clients(&self) -> Result<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>("SELECT * FROM clients ORDER BY last_name ASC, first_name ASC")
            .fetch_all(self.get_pool())
            .await?;

        Ok(clients)
    }

    pub async fn get_client(&self, id: i32) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE client_id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(client)
    }

    /// The client record linked to a user account, if any
    pub async fn get_client_for_user(&self, user_id: i32) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE user_id = $1 ORDER BY client_id ASC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(client)
    }

    /// `first_name`, `last_name` and `contact` must be present
    pub async fn create_client(&self, client: &ClientChanges) -> Result<Client> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (company_name, first_name, last_name, email, contact, address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&client.company_name)
        .bind(&client.first_name)
        .bind(&client.last_name)
        .bind(&client.email)
        .bind(&client.contact)
        .bind(&client.address)
        .fetch_one(self.get_pool())
        .await?;

        Ok(client)
    }

    pub async fn update_client(&self, id: i32, changes: &ClientChanges) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET company_name = COALESCE($1, company_name),
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                contact = COALESCE($5, contact),
                address = COALESCE($6, address),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE client_id = $7
            RETURNING *
            "#,
        )
        .bind(&changes.company_name)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.email)
        .bind(&changes.contact)
        .bind(&changes.address)
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(client)
    }

    pub async fn delete_client(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM clients WHERE client_id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
