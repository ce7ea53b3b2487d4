use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::orders::StatementData;
use super::{AppRouter, JsonBody, optional};
use crate::auth::AuthUser;
use crate::db::PaymentUpdate;
use crate::error::{ApiError, ApiResult};
use crate::models::{Order, Payment, UserType};
use crate::state::AppState;

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_payments).post(create_payment))
        .route(
            "/:id",
            get(get_payment).put(update_payment).patch(update_payment).delete(delete_payment),
        )
}

#[derive(Deserialize)]
struct CreatePaymentRequest {
    order_id: Option<i32>,
    amount: Option<f64>,
    method: Option<String>,
    reference: Option<String>,
}

#[derive(Deserialize)]
struct UpdatePaymentRequest {
    amount: Option<f64>,
    method: Option<String>,
    reference: Option<String>,
}

fn positive_amount(amount: f64) -> ApiResult<f64> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(ApiError::bad_request("amount must be greater than zero"))
    }
}

/// Mail the client a receipt with the current statement, when mail and an address are available
async fn send_receipt(state: &AppState, payment: &Payment, order: &Order) {
    let Some(mailer) = &state.mailer else {
        return;
    };

    let data = match StatementData::load(state, order).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Could not load statement for order {}: {e}", order.order_id);
            return;
        }
    };
    let Some(to) = data.client_email() else {
        return;
    };

    match mailer.receipt_message(to, payment, order, &data.statement(order)) {
        Ok(message) => mailer.deliver(message),
        Err(e) => warn!("Could not build receipt for payment {}: {e}", payment.payment_id),
    }
}

async fn create_payment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    JsonBody(body): JsonBody<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    caller.require(&state, &[UserType::Admin]).await?;

    let (Some(order_id), Some(amount), Some(method)) = (body.order_id, body.amount, optional(body.method)) else {
        return Err(ApiError::bad_request("order_id, amount and method are required"));
    };
    let amount = positive_amount(amount)?;

    let (payment, order) = state
        .db
        .record_payment(order_id, amount, &method, optional(body.reference).as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    info!(
        "Payment {} of {:.2} recorded on order {}, balance due {:.2}",
        payment.payment_id, payment.amount, order.order_id, order.balance_due
    );

    send_receipt(&state, &payment, &order).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Payment created successfully",
            "payment_id": payment.payment_id,
            "total_paid": order.total_paid,
            "balance_due": order.balance_due,
        })),
    ))
}

async fn list_payments(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<Vec<Payment>>> {
    caller.require(&state, &[UserType::Admin]).await?;
    Ok(Json(state.db.get_payments().await?))
}

async fn get_payment(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Payment>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let payment = state
        .db
        .get_payment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    Ok(Json(payment))
}

async fn update_payment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    JsonBody(body): JsonBody<UpdatePaymentRequest>,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let update = PaymentUpdate {
        amount: body.amount.map(positive_amount).transpose()?,
        method: optional(body.method),
        reference: body.reference,
    };

    let (payment, order) = state
        .db
        .update_payment(id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    info!("Payment {id} updated, order {} balance due {:.2}", order.order_id, order.balance_due);

    Ok(Json(json!({
        "message": "Payment updated successfully",
        "payment": payment,
        "total_paid": order.total_paid,
        "balance_due": order.balance_due,
    })))
}

async fn delete_payment(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let order = state
        .db
        .delete_payment(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    info!("Payment {id} deleted, order {} balance due {:.2}", order.order_id, order.balance_due);

    Ok(Json(json!({
        "message": "Payment deleted and order totals updated",
        "total_paid": order.total_paid,
        "balance_due": order.balance_due,
    })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::routes::testing::{TestApp, get_request, json_request};

    #[test]
    fn amounts_must_be_positive() {
        assert_eq!(positive_amount(12.5).unwrap(), 12.5);
        assert!(positive_amount(0.0).is_err());
        assert!(positive_amount(-3.0).is_err());
        assert!(positive_amount(f64::INFINITY).is_err());
    }

    #[tokio::test]
    async fn payment_routes_require_a_token() {
        let app = TestApp::new();

        let (status, _) = app.send(get_request("/api/v1/payments", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(json_request(
                "POST",
                "/api/v1/payments",
                None,
                json!({ "order_id": 1, "amount": 10.0, "method": "Cash" }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_numeric_amounts_are_rejected() {
        let app = TestApp::new();
        let token = app.token(1, crate::auth::TokenKind::Access);

        let (status, _) = app
            .send(json_request(
                "POST",
                "/api/v1/payments",
                Some(&token),
                json!({ "order_id": 1, "amount": "lots", "method": "Cash" }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
