use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{AppRouter, JsonBody, QueryParams, message, non_negative, optional, parse_date};
use crate::auth::AuthUser;
use crate::db::{CheckoutLine, NewOrder, OrderFilter, OrderUpdate};
use crate::error::{ApiError, ApiResult};
use crate::models::{CASH_ON_DELIVERY, Client, Order, OrderItem, OrderStats, Payment, Settlement, User, UserType};
use crate::state::AppState;
use crate::statement::OrderStatement;

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_orders).post(create_order))
        .route("/checkout", post(checkout))
        .route("/my-orders", get(my_orders))
        .route("/filter", get(filter_orders))
        .route("/stats", get(order_stats))
        .route("/report/financial", get(financial_report))
        .route("/client/:client_id", get(client_history))
        .route(
            "/:id",
            get(get_order).put(update_order).patch(update_order).delete(delete_order),
        )
        .route("/:id/payments", get(order_payments))
        .route("/:id/statement", get(order_statement))
        .route("/:id/items", get(list_items).post(add_item))
        .route("/:id/items/:item_id", delete(remove_item))
}

#[derive(Serialize)]
struct OrderWithItems {
    #[serde(flatten)]
    order: Order,
    items: Vec<OrderItem>,
}

#[derive(Serialize)]
struct OrderWithPayments {
    #[serde(flatten)]
    order: Order,
    payments: Vec<Payment>,
}

#[derive(Deserialize)]
struct CheckoutItem {
    product_id: i32,
    quantity: i32,
}

#[derive(Deserialize)]
struct CheckoutRequest {
    items: Option<Vec<CheckoutItem>>,
    client_id: Option<i32>,
    payment: Option<String>,
}

#[derive(Deserialize)]
struct CreateOrderRequest {
    project_id: Option<i32>,
    client_id: Option<i32>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct UpdateOrderRequest {
    status: Option<String>,
    notes: Option<String>,
    total_amount: Option<f64>,
}

#[derive(Deserialize)]
struct FilterQuery {
    status: Option<String>,
    start: Option<String>,
    end: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct AddItemRequest {
    product_id: Option<i32>,
    quantity: Option<i32>,
    price: Option<f64>,
}

fn group_by_order<T>(rows: Vec<T>, order_id: impl Fn(&T) -> i32) -> HashMap<i32, Vec<T>> {
    let mut grouped: HashMap<i32, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(order_id(&row)).or_default().push(row);
    }
    grouped
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Last instant of the day, so an end date includes that day's orders
fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    start_of_day(date) + Duration::days(1) - Duration::microseconds(1)
}

fn can_access(user: &User, order: &Order) -> bool {
    user.is_admin() || order.user_id == user.user_id
}

/// Load an order the caller is allowed to see
async fn accessible_order(state: &AppState, caller: AuthUser, id: i32) -> ApiResult<Order> {
    let user = caller.load(state).await?;
    let order = state
        .db
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    if !can_access(&user, &order) {
        return Err(ApiError::forbidden("Unauthorized access to this order"));
    }

    Ok(order)
}

async fn with_items(state: &AppState, orders: Vec<Order>) -> ApiResult<Vec<OrderWithItems>> {
    let ids: Vec<i32> = orders.iter().map(|o| o.order_id).collect();
    let mut items = group_by_order(state.db.get_items_for_orders(&ids).await?, |i| i.order_id);

    Ok(orders
        .into_iter()
        .map(|order| OrderWithItems {
            items: items.remove(&order.order_id).unwrap_or_default(),
            order,
        })
        .collect())
}

/// Everything an order statement shows besides the order itself
pub(super) struct StatementData {
    client: Option<Client>,
    items: Vec<OrderItem>,
    payments: Vec<Payment>,
    product_titles: HashMap<i32, String>,
}

impl StatementData {
    pub(super) async fn load(state: &AppState, order: &Order) -> ApiResult<Self> {
        let client = state.db.get_client(order.client_id).await?;
        let items = state.db.get_order_items(order.order_id).await?;
        let payments = state.db.get_payments_by_order(order.order_id).await?;

        let product_ids: Vec<i32> = items.iter().map(|i| i.product_id).collect();
        let product_titles = state
            .db
            .get_products_by_ids(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.title))
            .collect();

        Ok(Self {
            client,
            items,
            payments,
            product_titles,
        })
    }

    pub(super) fn client_email(&self) -> Option<&str> {
        self.client.as_ref().and_then(|c| c.email.as_deref())
    }

    pub(super) fn statement<'a>(&'a self, order: &'a Order) -> OrderStatement<'a> {
        OrderStatement {
            order,
            client: self.client.as_ref(),
            items: &self.items,
            payments: &self.payments,
            product_titles: self.product_titles.clone(),
        }
    }
}

/// Price each requested line from the catalogue
fn price_lines(requested: &[CheckoutItem], prices: &HashMap<i32, f64>) -> ApiResult<Vec<CheckoutLine>> {
    requested
        .iter()
        .map(|item| {
            prices
                .get(&item.product_id)
                .map(|&price| CheckoutLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price,
                })
                .ok_or_else(|| ApiError::not_found(format!("Product {} not found", item.product_id)))
        })
        .collect()
}

async fn checkout(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    JsonBody(body): JsonBody<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let requested = body.items.unwrap_or_default();
    if requested.is_empty() {
        return Err(ApiError::bad_request("No items in order"));
    }
    if let Some(item) = requested.iter().find(|i| i.quantity < 1) {
        return Err(ApiError::bad_request(format!(
            "Quantity for product {} must be at least 1",
            item.product_id
        )));
    }
    let method = optional(body.payment).unwrap_or_else(|| CASH_ON_DELIVERY.to_string());

    let user = caller.load(&state).await?;

    let client_id = match body.client_id {
        Some(id) => {
            if state.db.get_client(id).await?.is_none() {
                return Err(ApiError::not_found("Client not found"));
            }
            id
        }
        None => state
            .db
            .get_client_for_user(user.user_id)
            .await?
            .map(|c| c.client_id)
            .ok_or_else(|| ApiError::bad_request("client_id is required"))?,
    };

    let product_ids: Vec<i32> = requested.iter().map(|i| i.product_id).collect();
    let prices: HashMap<i32, f64> = state
        .db
        .get_products_by_ids(&product_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p.price))
        .collect();

    let lines = price_lines(&requested, &prices)?;
    let settlement = Settlement::for_method(&method, Utc::now().timestamp_millis());
    let (order, items, payment) = state.db.checkout(user.user_id, client_id, &lines, &settlement).await?;

    info!(
        "Order {} placed by user {} for {:.2} ({})",
        order.order_id, user.user_id, order.total_amount, method
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Order placed successfully",
            "order_id": order.order_id,
            "total_amount": order.total_amount,
            "total_paid": order.total_paid,
            "balance_due": order.balance_due,
            "status": order.status,
            "items": items,
            "payment_id": payment.map(|p| p.payment_id),
        })),
    ))
}

async fn my_orders(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<Value>> {
    let orders = state.db.get_orders_by_user(caller.user_id).await?;
    Ok(Json(json!({ "orders": orders })))
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    JsonBody(body): JsonBody<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let admin = caller.require(&state, &[UserType::Admin]).await?;

    let project = match body.project_id {
        Some(id) => Some(
            state
                .db
                .get_project(id)
                .await?
                .ok_or_else(|| ApiError::not_found("Project not found"))?,
        ),
        None => None,
    };

    let client_id = body
        .client_id
        .or(project.as_ref().map(|p| p.client_id))
        .ok_or_else(|| ApiError::bad_request("client_id is required"))?;
    if state.db.get_client(client_id).await?.is_none() {
        return Err(ApiError::not_found("Client not found"));
    }

    let order = state
        .db
        .create_order(&NewOrder {
            client_id,
            project_id: project.as_ref().map(|p| p.project_id),
            user_id: admin.user_id,
            notes: optional(body.notes),
            total_amount: project.and_then(|p| p.price).unwrap_or(0.0),
        })
        .await?;

    info!("Order {} created by admin {}", order.order_id, admin.user_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Order created successfully",
            "order_id": order.order_id,
        })),
    ))
}

async fn list_orders(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<Vec<OrderWithItems>>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let orders = state.db.get_orders().await?;
    Ok(Json(with_items(&state, orders).await?))
}

async fn get_order(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<OrderWithItems>> {
    let order = accessible_order(&state, caller, id).await?;
    let items = state.db.get_order_items(id).await?;

    Ok(Json(OrderWithItems { order, items }))
}

async fn order_payments(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<OrderWithPayments>> {
    let order = accessible_order(&state, caller, id).await?;
    let payments = state.db.get_payments_by_order(id).await?;

    Ok(Json(OrderWithPayments { order, payments }))
}

async fn order_statement(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Response> {
    let order = accessible_order(&state, caller, id).await?;
    let data = StatementData::load(&state, &order).await?;
    let statement = data.statement(&order);

    let disposition = format!("inline; filename=\"{}\"", statement.file_name());
    Ok((
        [
            (CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        statement.to_markdown(),
    )
        .into_response())
}

async fn update_order(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    JsonBody(body): JsonBody<UpdateOrderRequest>,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let update = OrderUpdate {
        status: optional(body.status),
        notes: body.notes,
        total_amount: body
            .total_amount
            .map(|t| non_negative(t, "total_amount"))
            .transpose()?,
    };

    let order = state
        .db
        .update_order(id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    info!("Order {id} updated, balance due {:.2}", order.balance_due);

    Ok(Json(json!({
        "message": "Order updated successfully",
        "order": order,
    })))
}

async fn delete_order(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    if !state.db.delete_order(id).await? {
        return Err(ApiError::not_found("Order not found"));
    }
    info!("Deleted order {id}");

    Ok(message("Order deleted successfully"))
}

async fn filter_orders(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    QueryParams(query): QueryParams<FilterQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let start = optional(query.start)
        .map(|raw| parse_date(&raw, "start date"))
        .transpose()?;
    let end = optional(query.end)
        .map(|raw| parse_date(&raw, "end date"))
        .transpose()?;
    if let Some(limit) = query.limit {
        if limit < 1 {
            return Err(ApiError::bad_request("limit must be a positive integer"));
        }
    }

    let user = caller.load(&state).await?;
    let filter = OrderFilter {
        user_id: (!user.is_admin()).then_some(user.user_id),
        status: optional(query.status),
        start: start.map(start_of_day),
        end: end.map(end_of_day),
        limit: query.limit,
    };

    Ok(Json(state.db.filter_orders(&filter).await?))
}

async fn order_stats(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<OrderStats>> {
    caller.require(&state, &[UserType::Admin]).await?;
    Ok(Json(state.db.order_stats().await?))
}

async fn client_history(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(client_id): Path<i32>,
) -> ApiResult<Json<Vec<OrderWithPayments>>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let orders = state.db.get_orders_by_client(client_id).await?;
    let ids: Vec<i32> = orders.iter().map(|o| o.order_id).collect();
    let mut payments = group_by_order(state.db.get_payments_for_orders(&ids).await?, |p| p.order_id);

    Ok(Json(
        orders
            .into_iter()
            .map(|order| OrderWithPayments {
                payments: payments.remove(&order.order_id).unwrap_or_default(),
                order,
            })
            .collect(),
    ))
}

async fn financial_report(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let payments = state.db.get_payments().await?;
    Ok(Json(json!({
        "count": payments.len(),
        "report": payments,
    })))
}

async fn list_items(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Vec<OrderItem>>> {
    accessible_order(&state, caller, id).await?;
    Ok(Json(state.db.get_order_items(id).await?))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    JsonBody(body): JsonBody<AddItemRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    caller.require(&state, &[UserType::Admin]).await?;

    let product_id = body
        .product_id
        .ok_or_else(|| ApiError::bad_request("product_id is required"))?;
    let quantity = body
        .quantity
        .filter(|q| *q >= 1)
        .ok_or_else(|| ApiError::bad_request("quantity must be at least 1"))?;
    let override_price = body.price.map(|p| non_negative(p, "price")).transpose()?;

    let product = state
        .db
        .get_product(product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let line = CheckoutLine {
        product_id,
        quantity,
        price: override_price.unwrap_or(product.price),
    };
    let (item, order) = state
        .db
        .add_order_item(id, &line)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    info!("Added item {} to order {id}, total now {:.2}", item.id, order.total_amount);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Item added to order",
            "item": item,
            "order": order,
        })),
    ))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path((id, item_id)): Path<(i32, i32)>,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let order = state
        .db
        .remove_order_item(id, item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order item not found"))?;

    info!("Removed item {item_id} from order {id}, total now {:.2}", order.total_amount);

    Ok(Json(json!({
        "message": "Item removed from order",
        "order": order,
    })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::auth::TokenKind;
    use crate::routes::testing::{TestApp, get_request, json_request};

    fn order(user_id: i32) -> Order {
        Order {
            order_id: 1,
            client_id: 1,
            project_id: None,
            user_id,
            status: "Pending".to_string(),
            total_amount: 10.0,
            total_paid: 0.0,
            balance_due: 10.0,
            notes: None,
            created_at: Utc::now().naive_utc(),
            updated_at: None,
        }
    }

    fn user(user_id: i32, user_type: &str) -> User {
        User {
            user_id,
            first_name: "Yaw".to_string(),
            last_name: "Asante".to_string(),
            email: "yaw@example.com".to_string(),
            contact: "0270000000".to_string(),
            image: None,
            biography: None,
            password: String::new(),
            user_type: user_type.to_string(),
            created_at: Utc::now().naive_utc(),
            updated_at: None,
        }
    }

    #[test]
    fn owners_and_admins_can_access_orders() {
        assert!(can_access(&user(5, "client"), &order(5)));
        assert!(can_access(&user(1, "admin"), &order(5)));
        assert!(!can_access(&user(6, "client"), &order(5)));
        assert!(!can_access(&user(6, "staff"), &order(5)));
    }

    #[test]
    fn end_dates_cover_the_whole_day() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let late = day.and_hms_opt(23, 59, 59).unwrap();

        assert!(start_of_day(day) < late);
        assert!(end_of_day(day) > late);
        assert!(end_of_day(day) < NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_time(NaiveTime::MIN));
    }

    #[test]
    fn rows_are_grouped_per_order() {
        let rows = vec![(1, "a"), (2, "b"), (1, "c")];
        let grouped = group_by_order(rows, |r| r.0);

        assert_eq!(grouped[&1], vec![(1, "a"), (1, "c")]);
        assert_eq!(grouped[&2], vec![(2, "b")]);
    }

    #[test]
    fn checkout_lines_use_catalogue_prices() {
        let prices = HashMap::from([(4, 12.5), (9, 0.0)]);
        let requested = vec![
            CheckoutItem { product_id: 4, quantity: 2 },
            CheckoutItem { product_id: 9, quantity: 1 },
        ];

        let lines = price_lines(&requested, &prices).unwrap();
        assert_eq!(
            lines,
            vec![
                CheckoutLine { product_id: 4, quantity: 2, price: 12.5 },
                CheckoutLine { product_id: 9, quantity: 1, price: 0.0 },
            ]
        );
        assert_eq!(lines.iter().map(CheckoutLine::line_total).sum::<f64>(), 25.0);
    }

    #[test]
    fn unknown_products_fail_checkout() {
        let prices = HashMap::from([(4, 12.5)]);
        let requested = vec![
            CheckoutItem { product_id: 4, quantity: 1 },
            CheckoutItem { product_id: 77, quantity: 1 },
        ];

        let err = price_lines(&requested, &prices).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.to_string(), "Product 77 not found");
    }

    #[tokio::test]
    async fn checkout_requires_items() {
        let app = TestApp::new();
        let token = app.token(3, TokenKind::Access);

        let (status, body) = app
            .send(json_request("POST", "/api/v1/orders/checkout", Some(&token), json!({ "items": [] })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No items in order");

        let (status, body) = app
            .send(json_request(
                "POST",
                "/api/v1/orders/checkout",
                Some(&token),
                json!({ "items": [{ "product_id": 4, "quantity": 0 }] }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Quantity for product 4 must be at least 1");
    }

    #[tokio::test]
    async fn checkout_requires_a_token() {
        let app = TestApp::new();
        let (status, _) = app
            .send(json_request(
                "POST",
                "/api/v1/orders/checkout",
                None,
                json!({ "items": [{ "product_id": 1, "quantity": 1 }] }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn filter_rejects_bad_dates() {
        let app = TestApp::new();
        let token = app.token(3, TokenKind::Access);

        let (status, body) = app
            .send(get_request("/api/v1/orders/filter?start=31-05-2024", Some(&token)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid start date format, expected YYYY-MM-DD");

        let (status, _) = app
            .send(get_request("/api/v1/orders/filter?end=yesterday", Some(&token)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(get_request("/api/v1/orders/filter?limit=0", Some(&token)))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_routes_require_a_token() {
        let app = TestApp::new();

        for uri in [
            "/api/v1/orders",
            "/api/v1/orders/stats",
            "/api/v1/orders/report/financial",
            "/api/v1/orders/client/1",
            "/api/v1/orders/1/statement",
            "/api/v1/orders/1/items",
        ] {
            let (status, _) = app.send(get_request(uri, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }
}
