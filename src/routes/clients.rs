use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{AppRouter, JsonBody, message, optional, validate_email};
use crate::auth::AuthUser;
use crate::db::ClientChanges;
use crate::error::{ApiError, ApiResult};
use crate::models::{Client, UserType};
use crate::state::AppState;

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_clients).post(create_client))
        .route(
            "/:id",
            get(get_client).put(update_client).patch(update_client).delete(delete_client),
        )
}

#[derive(Deserialize)]
struct ClientRequest {
    company_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    contact: Option<String>,
    address: Option<String>,
}

impl ClientRequest {
    fn into_changes(self) -> ApiResult<ClientChanges> {
        let email = optional(self.email).map(|e| e.to_lowercase());
        if let Some(email) = &email {
            validate_email(email)?;
        }

        Ok(ClientChanges {
            company_name: optional(self.company_name),
            first_name: optional(self.first_name),
            last_name: optional(self.last_name),
            email,
            contact: optional(self.contact),
            address: optional(self.address),
        })
    }
}

#[derive(Serialize)]
struct ClientListing {
    #[serde(flatten)]
    client: Client,
    full_name: String,
}

impl From<Client> for ClientListing {
    fn from(client: Client) -> Self {
        Self {
            full_name: client.full_name(),
            client,
        }
    }
}

async fn create_client(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    JsonBody(body): JsonBody<ClientRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    caller.require(&state, &[UserType::Admin]).await?;

    if optional(body.first_name.clone()).is_none()
        || optional(body.last_name.clone()).is_none()
        || optional(body.contact.clone()).is_none()
    {
        return Err(ApiError::bad_request("first_name, last_name, and contact are required"));
    }
    let changes = body.into_changes()?;

    let client = state.db.create_client(&changes).await?;
    info!("Created client {}", client.client_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Client created successfully",
            "client_id": client.client_id,
            "company_name": client.company_name,
        })),
    ))
}

async fn list_clients(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<Vec<ClientListing>>> {
    caller.require(&state, &[UserType::Admin, UserType::Staff]).await?;

    let clients = state.db.get_clients().await?;
    Ok(Json(clients.into_iter().map(ClientListing::from).collect()))
}

async fn get_client(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ClientListing>> {
    caller.require(&state, &[UserType::Admin, UserType::Staff]).await?;

    let client = state
        .db
        .get_client(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))?;

    Ok(Json(client.into()))
}

async fn update_client(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    JsonBody(body): JsonBody<ClientRequest>,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let changes = body.into_changes()?;
    let client = state
        .db
        .update_client(id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))?;

    Ok(Json(json!({
        "message": "Client updated successfully",
        "client": ClientListing::from(client),
    })))
}

async fn delete_client(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    if !state.db.delete_client(id).await? {
        return Err(ApiError::not_found("Client not found"));
    }
    info!("Deleted client {id}");

    Ok(message("Client deleted successfully"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::routes::testing::*;

    #[tokio::test]
    async fn client_routes_require_a_token() {
        let app = TestApp::new();

        let (status, _) = app.send(get_request("/api/v1/clients", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(json_request("POST", "/api/v1/clients", None, json!({ "first_name": "Esi" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn listing_includes_full_name() {
        let client = Client {
            client_id: 2,
            user_id: None,
            company_name: None,
            first_name: "Esi".to_string(),
            last_name: "Owusu".to_string(),
            email: None,
            contact: "0551234567".to_string(),
            address: None,
            created_at: Utc::now().naive_utc(),
            updated_at: None,
        };

        let value = serde_json::to_value(ClientListing::from(client)).unwrap();
        assert_eq!(value["full_name"], "Esi Owusu");
        assert_eq!(value["client_id"], 2);
    }

    #[test]
    fn blank_fields_do_not_overwrite() {
        let request = ClientRequest {
            company_name: Some("  ".to_string()),
            first_name: Some(" Esi ".to_string()),
            last_name: None,
            email: Some("ESI@Example.com".to_string()),
            contact: None,
            address: None,
        };

        let changes = request.into_changes().unwrap();
        assert_eq!(changes.company_name, None);
        assert_eq!(changes.first_name.as_deref(), Some("Esi"));
        assert_eq!(changes.email.as_deref(), Some("esi@example.com"));
    }
}
