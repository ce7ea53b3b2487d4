use anyhow::Result;
use chrono::NaiveDateTime;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::Database;
use crate::models::{Balance, Order, OrderItem, OrderStats, Payment, Settlement, tally_statuses};

pub struct NewOrder {
    pub client_id: i32,
    pub project_id: Option<i32>,
    pub user_id: i32,
    pub notes: Option<String>,
    pub total_amount: f64,
}

/// A priced line for checkout
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutLine {
    pub product_id: i32,
    pub quantity: i32,
    pub price: f64,
}

impl CheckoutLine {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Default)]
pub struct OrderUpdate {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub total_amount: Option<f64>,
}

#[derive(Debug, Default)]
pub struct OrderFilter {
    /// Restrict to orders placed by this user
    pub user_id: Option<i32>,
    pub status: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub limit: Option<i64>,
}

/// Lock an order row for the rest of the transaction
pub(super) async fn lock_order(conn: &mut PgConnection, order_id: i32) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;

    Ok(order)
}

/// Persist new totals, always deriving `balance_due` from them
pub(super) async fn store_balance(conn: &mut PgConnection, order_id: i32, balance: Balance) -> Result<Order> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET total_amount = $1, total_paid = $2, balance_due = $3, updated_at = NOW() AT TIME ZONE 'utc'
        WHERE order_id = $4
        RETURNING *
        "#,
    )
    .bind(balance.total_amount)
    .bind(balance.total_paid)
    .bind(balance.balance_due())
    .bind(order_id)
    .fetch_one(conn)
    .await?;

    Ok(order)
}

impl Database {
    pub async fn get_orders(&self) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC")
            .fetch_all(self.get_pool())
            .await?;

        Ok(orders)
    }

    pub async fn get_orders_by_user(&self, user_id: i32) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(orders)
    }

    pub async fn get_orders_by_client(&self, client_id: i32) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE client_id = $1 ORDER BY created_at DESC",
        )
        .bind(client_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(orders)
    }

    pub async fn get_order(&self, id: i32) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(order)
    }

    pub async fn filter_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");

        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(status) = &filter.status {
            query.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(start) = filter.start {
            query.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            query.push(" AND created_at <= ").push_bind(end);
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let orders = query
            .build_query_as::<Order>()
            .fetch_all(self.get_pool())
            .await?;

        Ok(orders)
    }

    pub async fn create_order(&self, order: &NewOrder) -> Result<Order> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (client_id, project_id, user_id, notes, total_amount, total_paid, balance_due)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            RETURNING *
            "#,
        )
        .bind(order.client_id)
        .bind(order.project_id)
        .bind(order.user_id)
        .bind(&order.notes)
        .bind(order.total_amount)
        .bind(Balance::new(order.total_amount, 0.0).balance_due())
        .fetch_one(self.get_pool())
        .await?;

        Ok(order)
    }

    /// Place an order with its lines, settled according to `settlement`
    pub async fn checkout(
        &self,
        user_id: i32,
        client_id: i32,
        lines: &[CheckoutLine],
        settlement: &Settlement,
    ) -> Result<(Order, Vec<OrderItem>, Option<Payment>)> {
        let total_amount: f64 = lines.iter().map(CheckoutLine::line_total).sum();
        let balance = settlement.balance(total_amount);

        let mut tx = self.get_pool().begin().await?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (client_id, user_id, status, total_amount, total_paid, balance_due)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(client_id)
        .bind(user_id)
        .bind(settlement.status())
        .bind(balance.total_amount)
        .bind(balance.total_paid)
        .bind(balance.balance_due())
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, price)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(order.order_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        let payment = match settlement.payment(total_amount) {
            Some((method, reference)) => Some(
                sqlx::query_as::<_, Payment>(
                    r#"
                    INSERT INTO payments (order_id, amount, method, reference)
                    VALUES ($1, $2, $3, $4)
                    RETURNING *
                    "#,
                )
                .bind(order.order_id)
                .bind(total_amount)
                .bind(method)
                .bind(reference)
                .fetch_one(&mut *tx)
                .await?,
            ),
            None => None,
        };

        tx.commit().await?;

        Ok((order, items, payment))
    }

    pub async fn update_order(&self, id: i32, update: &OrderUpdate) -> Result<Option<Order>> {
        let mut tx = self.get_pool().begin().await?;

        let Some(order) = lock_order(&mut *tx, id).await? else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET status = COALESCE($1, status), notes = COALESCE($2, notes)
            WHERE order_id = $3
            "#,
        )
        .bind(&update.status)
        .bind(&update.notes)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let balance = match update.total_amount {
            Some(total) => order.balance().with_total(total),
            None => order.balance(),
        };
        let order = store_balance(&mut *tx, id, balance).await?;

        tx.commit().await?;

        Ok(Some(order))
    }

    pub async fn delete_order(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Line item operations
    pub async fn get_order_items(&self, order_id: i32) -> Result<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(items)
    }

    /// Items of several orders in one round trip
    pub async fn get_items_for_orders(&self, order_ids: &[i32]) -> Result<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY order_id ASC, id ASC",
        )
        .bind(order_ids)
        .fetch_all(self.get_pool())
        .await?;

        Ok(items)
    }

    /// Add a line and grow the order total; `None` when the order does not exist
    pub async fn add_order_item(&self, order_id: i32, line: &CheckoutLine) -> Result<Option<(OrderItem, Order)>> {
        let mut tx = self.get_pool().begin().await?;

        let Some(order) = lock_order(&mut *tx, order_id).await? else {
            return Ok(None);
        };

        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.price)
        .fetch_one(&mut *tx)
        .await?;

        let order = store_balance(&mut *tx, order_id, order.balance().add_line(item.line_total())).await?;

        tx.commit().await?;

        Ok(Some((item, order)))
    }

    /// Remove a line of this order and shrink the total; `None` when either is missing
    pub async fn remove_order_item(&self, order_id: i32, item_id: i32) -> Result<Option<Order>> {
        let mut tx = self.get_pool().begin().await?;

        let Some(order) = lock_order(&mut *tx, order_id).await? else {
            return Ok(None);
        };

        let item = sqlx::query_as::<_, OrderItem>(
            "DELETE FROM order_items WHERE id = $1 AND order_id = $2 RETURNING *",
        )
        .bind(item_id)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(item) = item else {
            return Ok(None);
        };

        let order = store_balance(&mut *tx, order_id, order.balance().remove_line(item.line_total())).await?;

        tx.commit().await?;

        Ok(Some(order))
    }

    pub async fn order_stats(&self) -> Result<OrderStats> {
        let (total_orders, today_orders, total_revenue, monthly_revenue) =
            sqlx::query_as::<_, (i64, i64, f64, f64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE created_at::date = (NOW() AT TIME ZONE 'utc')::date),
                    COALESCE(SUM(total_amount), 0)::float8,
                    COALESCE(SUM(total_amount) FILTER (
                        WHERE date_trunc('month', created_at) = date_trunc('month', NOW() AT TIME ZONE 'utc')
                    ), 0)::float8
                FROM orders
                "#,
            )
            .fetch_one(self.get_pool())
            .await?;

        let by_status = sqlx::query_as::<_, (String, i64)>("SELECT status, COUNT(*) FROM orders GROUP BY status")
            .fetch_all(self.get_pool())
            .await?;
        let (pending_orders, completed_orders) =
            tally_statuses(by_status.iter().map(|(status, count)| (status.as_str(), *count)));

        Ok(OrderStats {
            total_orders,
            pending_orders,
            completed_orders,
            today_orders,
            total_revenue,
            monthly_revenue,
        })
    }
}
