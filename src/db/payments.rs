use anyhow::Result;

use super::Database;
use super::orders::{lock_order, store_balance};
use crate::models::{Order, Payment};

#[derive(Debug, Default)]
pub struct PaymentUpdate {
    pub amount: Option<f64>,
    pub method: Option<String>,
    pub reference: Option<String>,
}

impl Database {
    pub async fn get_payments(&self) -> Result<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>("SELECT * FROM payments ORDER BY paid_at DESC")
            .fetch_all(self.get_pool())
            .await?;

        Ok(payments)
    }

    pub async fn get_payment(&self, id: i32) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE payment_id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(payment)
    }

    pub async fn get_payments_by_order(&self, order_id: i32) -> Result<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY paid_at ASC",
        )
        .bind(order_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(payments)
    }

    pub async fn get_payments_for_orders(&self, order_ids: &[i32]) -> Result<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = ANY($1) ORDER BY paid_at ASC",
        )
        .bind(order_ids)
        .fetch_all(self.get_pool())
        .await?;

        Ok(payments)
    }

    /// Record a payment against an order; `None` when the order does not exist
    pub async fn record_payment(
        &self,
        order_id: i32,
        amount: f64,
        method: &str,
        reference: Option<&str>,
    ) -> Result<Option<(Payment, Order)>> {
        let mut tx = self.get_pool().begin().await?;

        let Some(order) = lock_order(&mut *tx, order_id).await? else {
            return Ok(None);
        };

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (order_id, amount, method, reference)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(amount)
        .bind(method)
        .bind(reference)
        .fetch_one(&mut *tx)
        .await?;

        let order = store_balance(&mut *tx, order_id, order.balance().record_payment(amount)).await?;

        tx.commit().await?;

        Ok(Some((payment, order)))
    }

    pub async fn update_payment(&self, id: i32, update: &PaymentUpdate) -> Result<Option<(Payment, Order)>> {
        let mut tx = self.get_pool().begin().await?;

        let existing = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE payment_id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        let Some(order) = lock_order(&mut *tx, existing.order_id).await? else {
            return Ok(None);
        };

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET amount = COALESCE($1, amount),
                method = COALESCE($2, method),
                reference = COALESCE($3, reference)
            WHERE payment_id = $4
            RETURNING *
            "#,
        )
        .bind(update.amount)
        .bind(&update.method)
        .bind(&update.reference)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let balance = order.balance().amend_payment(existing.amount, payment.amount);
        let order = store_balance(&mut *tx, order.order_id, balance).await?;

        tx.commit().await?;

        Ok(Some((payment, order)))
    }

    /// Delete a payment and take it back out of the order's paid total
    pub async fn delete_payment(&self, id: i32) -> Result<Option<Order>> {
        let mut tx = self.get_pool().begin().await?;

        let payment = sqlx::query_as::<_, Payment>("DELETE FROM payments WHERE payment_id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(payment) = payment else {
            return Ok(None);
        };

        let Some(order) = lock_order(&mut *tx, payment.order_id).await? else {
            return Ok(None);
        };

        let order = store_balance(&mut *tx, order.order_id, order.balance().remove_payment(payment.amount)).await?;

        tx.commit().await?;

        Ok(Some(order))
    }
}
