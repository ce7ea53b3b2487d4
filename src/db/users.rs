use anyhow::Result;
use sqlx::{Postgres, QueryBuilder};

use super::Database;
use crate::models::{Client, User, UserType};

pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact: String,
    pub password_hash: String,
    pub user_type: UserType,
    pub company_name: Option<String>,
    pub address: Option<String>,
}

/// Fields left as `None` keep their stored value
#[derive(Debug, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub image: Option<String>,
    pub biography: Option<String>,
    pub password_hash: Option<String>,
    pub user_type: Option<UserType>,
}

#[derive(Debug, Default)]
pub struct UserFilter {
    pub user_type: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub newest_first: bool,
}

impl Database {
    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(user)
    }

    /// Whether another user already holds this email
    pub async fn email_taken(&self, email: &str, except_user: Option<i32>) -> Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND user_id IS DISTINCT FROM $2)",
        )
        .bind(email)
        .bind(except_user)
        .fetch_one(self.get_pool())
        .await?;

        Ok(taken)
    }

    /// Whether another user already holds this phone number
    pub async fn contact_taken(&self, contact: &str, except_user: Option<i32>) -> Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE contact = $1 AND user_id IS DISTINCT FROM $2)",
        )
        .bind(contact)
        .bind(except_user)
        .fetch_one(self.get_pool())
        .await?;

        Ok(taken)
    }

    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM users WHERE TRUE");

        if let Some(user_type) = &filter.user_type {
            query.push(" AND user_type = ").push_bind(user_type.clone());
        }
        if let Some(email) = &filter.email {
            query.push(" AND email ILIKE ").push_bind(format!("%{email}%"));
        }
        if let Some(name) = &filter.name {
            let pattern = format!("%{name}%");
            query
                .push(" AND (first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR last_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(if filter.newest_first {
            " ORDER BY created_at DESC"
        } else {
            " ORDER BY created_at ASC"
        });

        let users = query
            .build_query_as::<User>()
            .fetch_all(self.get_pool())
            .await?;

        Ok(users)
    }

    /// Insert a user and, for client accounts, the linked client record
    pub async fn register_user(&self, new_user: &NewUser) -> Result<(User, Option<Client>)> {
        let mut tx = self.get_pool().begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (first_name, last_name, email, contact, password, user_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.email)
        .bind(&new_user.contact)
        .bind(&new_user.password_hash)
        .bind(new_user.user_type.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let client = if new_user.user_type == UserType::Client {
            let client = sqlx::query_as::<_, Client>(
                r#"
                INSERT INTO clients (user_id, company_name, first_name, last_name, email, contact, address)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(user.user_id)
            .bind(&new_user.company_name)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(&new_user.email)
            .bind(&new_user.contact)
            .bind(&new_user.address)
            .fetch_one(&mut *tx)
            .await?;
            Some(client)
        } else {
            None
        };

        tx.commit().await?;

        Ok((user, client))
    }

    pub async fn update_user(&self, id: i32, changes: &UserChanges) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                email = COALESCE($3, email),
                contact = COALESCE($4, contact),
                image = COALESCE($5, image),
                biography = COALESCE($6, biography),
                password = COALESCE($7, password),
                user_type = COALESCE($8, user_type),
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE user_id = $9
            RETURNING *
            "#,
        )
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.email)
        .bind(&changes.contact)
        .bind(&changes.image)
        .bind(&changes.biography)
        .bind(&changes.password_hash)
        .bind(changes.user_type.map(|t| t.as_str()))
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(user)
    }

    /// Returns false when no such user existed
    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
