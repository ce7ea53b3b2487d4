use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::auth::check_password;
use super::{AppRouter, JsonBody, QueryParams, message, optional, validate_email};
use crate::auth::{AuthUser, hash_password};
use crate::db::{UserChanges, UserFilter};
use crate::error::{ApiError, ApiResult};
use crate::models::{UserType, UserView};
use crate::state::AppState;

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user).put(update_user).patch(update_user).delete(delete_user))
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(rename = "type")]
    user_type: Option<String>,
    email: Option<String>,
    name: Option<String>,
    sort: Option<String>,
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    contact: Option<String>,
    password: Option<String>,
    image: Option<String>,
    biography: Option<String>,
    user_type: Option<String>,
}

/// Oldest first unless `desc` is asked for
fn newest_first(sort: Option<&str>) -> bool {
    sort.is_some_and(|s| s.trim().eq_ignore_ascii_case("desc"))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    QueryParams(query): QueryParams<UserQuery>,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin, UserType::Staff]).await?;

    let filter = UserFilter {
        user_type: optional(query.user_type).map(|t| t.to_lowercase()),
        email: optional(query.email),
        name: optional(query.name),
        newest_first: newest_first(query.sort.as_deref()),
    };
    let users: Vec<UserView> = state.db.list_users(&filter).await?.iter().map(UserView::from).collect();

    Ok(Json(json!({
        "message": "Users retrieved successfully",
        "total_users": users.len(),
        "users": users,
    })))
}

async fn get_user(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<UserView>> {
    let current = caller.load(&state).await?;
    let privileged = current.role().is_some_and(|r| r.is_privileged());
    if !privileged && current.user_id != id {
        return Err(ApiError::forbidden("You can only view your own profile"));
    }

    let user = state
        .db
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserView::from(&user)))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    JsonBody(body): JsonBody<UpdateUserRequest>,
) -> ApiResult<Json<Value>> {
    let current = caller.load(&state).await?;
    if !current.is_admin() && current.user_id != id {
        return Err(ApiError::forbidden("You can only update your own profile"));
    }

    let user_type = match optional(body.user_type) {
        None => None,
        Some(_) if !current.is_admin() => {
            return Err(ApiError::forbidden("Only admins can change a user's role"));
        }
        Some(raw) => Some(
            raw.to_lowercase()
                .parse::<UserType>()
                .map_err(|_| ApiError::bad_request("user_type must be one of admin, staff or client"))?,
        ),
    };

    let email = optional(body.email).map(|e| e.to_lowercase());
    if let Some(email) = &email {
        validate_email(email)?;
        if state.db.email_taken(email, Some(id)).await? {
            return Err(ApiError::conflict("Email is already registered"));
        }
    }
    let contact = optional(body.contact);
    if let Some(contact) = &contact {
        if state.db.contact_taken(contact, Some(id)).await? {
            return Err(ApiError::conflict("Contact is already registered"));
        }
    }

    let password_hash = match body.password.filter(|p| !p.is_empty()) {
        Some(password) => {
            check_password(&password)?;
            Some(hash_password(password).await?)
        }
        None => None,
    };

    let changes = UserChanges {
        first_name: optional(body.first_name),
        last_name: optional(body.last_name),
        email,
        contact,
        image: optional(body.image),
        biography: body.biography,
        password_hash,
        user_type,
    };

    let user = state
        .db
        .update_user(id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("User {} updated by {}", id, current.user_id);

    Ok(Json(json!({
        "message": "User updated successfully",
        "user": UserView::from(&user),
    })))
}

async fn delete_user(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    let current = caller.load(&state).await?;
    if !current.is_admin() {
        return Err(ApiError::forbidden("Only admins can delete users"));
    }

    if !state.db.delete_user(id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!("User {} deleted by {}", id, current.user_id);

    Ok(message("User deleted successfully"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::newest_first;
    use crate::routes::testing::*;

    #[test]
    fn users_are_listed_oldest_first_unless_desc() {
        assert!(!newest_first(None));
        assert!(!newest_first(Some("asc")));
        assert!(!newest_first(Some("newest")));
        assert!(newest_first(Some("desc")));
        assert!(newest_first(Some("DESC")));
    }

    #[tokio::test]
    async fn every_route_requires_a_token() {
        let app = TestApp::new();

        let (status, _) = app.send(get_request("/api/v1/users", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.send(get_request("/api/v1/users/1", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(json_request("PATCH", "/api/v1/users/1", None, json!({ "first_name": "Kwame" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.send(json_request("DELETE", "/api/v1/users/1", None, json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_tokens_are_rejected() {
        let app = TestApp::new();
        let (status, body) = app.send(get_request("/api/v1/users", Some("not.a.jwt"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");
    }

    #[tokio::test]
    async fn non_numeric_ids_are_rejected() {
        let app = TestApp::new();
        let token = app.token(1, crate::auth::TokenKind::Access);
        let (status, _) = app.send(get_request("/api/v1/users/abc", Some(&token))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
