use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{AppRouter, JsonBody, optional, required, validate_email};
use crate::auth::{AuthUser, MIN_PASSWORD_LEN, RefreshUser, TokenKind, hash_password, verify_password};
use crate::db::NewUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{User, UserType, UserView};
use crate::state::AppState;

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/token/refresh", post(refresh))
        .route("/me", get(me))
}

#[derive(Deserialize)]
struct RegisterRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    contact: Option<String>,
    password: Option<String>,
    user_type: Option<String>,
    company_name: Option<String>,
    address: Option<String>,
    super_key: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

fn summary(user: &User) -> Value {
    json!({
        "id": user.user_id,
        "name": user.display_name(),
        "email": user.email,
        "user_type": user.user_type,
        "created_at": user.created_at,
    })
}

pub fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

async fn register(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let first_name = required(body.first_name, "first_name")?;
    let last_name = required(body.last_name, "last_name")?;
    let email = required(body.email, "email")?.to_lowercase();
    let contact = required(body.contact, "contact")?;
    let password = body
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("password is required"))?;

    check_password(&password)?;
    validate_email(&email)?;

    let user_type = match optional(body.user_type) {
        None => UserType::Client,
        Some(raw) => raw
            .to_lowercase()
            .parse::<UserType>()
            .map_err(|_| ApiError::bad_request("user_type must be one of admin, staff or client"))?,
    };

    if user_type.is_privileged() {
        match body.super_key.as_deref() {
            None | Some("") => {
                return Err(ApiError::bad_request(format!(
                    "super_key is required to register a {user_type} account"
                )));
            }
            Some(key) if key != state.config.super_key => {
                return Err(ApiError::unauthorized("Invalid super key"));
            }
            Some(_) => {}
        }
    }

    if state.db.email_taken(&email, None).await? {
        return Err(ApiError::conflict("Email is already registered"));
    }
    if state.db.contact_taken(&contact, None).await? {
        return Err(ApiError::conflict("Contact is already registered"));
    }

    let password_hash = hash_password(password).await?;
    let (user, client) = state
        .db
        .register_user(&NewUser {
            first_name,
            last_name,
            email,
            contact,
            password_hash,
            user_type,
            company_name: optional(body.company_name),
            address: optional(body.address),
        })
        .await?;

    info!("Registered {} account {}", user.user_type, user.user_id);

    if let Some(mailer) = &state.mailer {
        match mailer.welcome_message(&user) {
            Ok(message) => mailer.deliver(message),
            Err(e) => warn!("Could not build welcome mail for user {}: {e}", user.user_id),
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user": summary(&user),
            "client_id": client.map(|c| c.client_id),
        })),
    ))
}

async fn login(State(state): State<Arc<AppState>>, JsonBody(body): JsonBody<LoginRequest>) -> ApiResult<Json<Value>> {
    let email = required(body.email, "email")?.to_lowercase();
    let password = body
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("password is required"))?;

    let Some(user) = state.db.find_user_by_email(&email).await? else {
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    if !verify_password(password, user.password.clone()).await? {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let access_token = state.jwt.issue(user.user_id, TokenKind::Access)?;
    let refresh_token = state.jwt.issue(user.user_id, TokenKind::Refresh)?;

    info!("User {} logged in", user.user_id);

    Ok(Json(json!({
        "message": "Login successful",
        "access_token": access_token,
        "refresh_token": refresh_token,
        "user": summary(&user),
    })))
}

async fn refresh(State(state): State<Arc<AppState>>, caller: RefreshUser) -> ApiResult<Json<Value>> {
    let user = state
        .db
        .get_user(caller.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    let access_token = state.jwt.issue(user.user_id, TokenKind::Access)?;

    Ok(Json(json!({ "access_token": access_token })))
}

async fn me(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<UserView>> {
    let user = caller.load(&state).await?;
    Ok(Json(UserView::from(&user)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::routes::testing::*;

    fn registration(overrides: Value) -> Value {
        let mut body = json!({
            "first_name": "Ama",
            "last_name": "Mensah",
            "email": "ama@example.com",
            "contact": "0240000000",
            "password": "longenough",
        });
        if let (Some(base), Some(extra)) = (body.as_object_mut(), overrides.as_object()) {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        body
    }

    #[test]
    fn summary_names_first_then_last() {
        let user = User {
            user_id: 3,
            first_name: "Ama".to_string(),
            last_name: "Mensah".to_string(),
            email: "ama@example.com".to_string(),
            contact: "0240000000".to_string(),
            image: None,
            biography: None,
            password: "$2b$12$hash".to_string(),
            user_type: "client".to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            updated_at: None,
        };

        let body = summary(&user);
        assert_eq!(body["name"], "Ama Mensah");
        assert_eq!(body["id"], 3);
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn register_rejects_missing_fields() {
        let app = TestApp::new();
        let (status, body) = app
            .send(json_request("POST", "/api/v1/auth/register", None, json!({ "first_name": "Ama" })))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "last_name is required");
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let app = TestApp::new();
        let (status, body) = app
            .send(json_request("POST", "/api/v1/auth/register", None, registration(json!({ "password": "short" }))))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Password must be at least 8 characters long");
    }

    #[tokio::test]
    async fn register_rejects_bad_email_and_role() {
        let app = TestApp::new();

        let (status, _) = app
            .send(json_request("POST", "/api/v1/auth/register", None, registration(json!({ "email": "nope" }))))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .send(json_request("POST", "/api/v1/auth/register", None, registration(json!({ "user_type": "owner" }))))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "user_type must be one of admin, staff or client");
    }

    #[tokio::test]
    async fn privileged_registration_needs_super_key() {
        let app = TestApp::new();

        let (status, _) = app
            .send(json_request("POST", "/api/v1/auth/register", None, registration(json!({ "user_type": "admin" }))))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .send(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                registration(json!({ "user_type": "staff", "super_key": "guess" })),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid super key");
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let app = TestApp::new();
        let (status, body) = app
            .send(json_request("POST", "/api/v1/auth/login", None, json!({ "email": "ama@example.com" })))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "password is required");
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let app = TestApp::new();
        let request = axum::http::Request::post("/api/v1/auth/login")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();

        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens() {
        let app = TestApp::new();
        let access = app.token(1, TokenKind::Access);

        let (status, body) = app
            .send(json_request("POST", "/api/v1/auth/token/refresh", Some(&access), json!({})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Only refresh tokens are allowed");
    }

    #[tokio::test]
    async fn me_requires_a_token() {
        let app = TestApp::new();

        let (status, body) = app.send(get_request("/api/v1/auth/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Missing Authorization Header");

        let refresh = app.token(1, TokenKind::Refresh);
        let (status, body) = app.send(get_request("/api/v1/auth/me", Some(&refresh))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Only access tokens are allowed");
    }

    #[test]
    fn password_length_counts_characters() {
        assert!(check_password("12345678").is_ok());
        assert!(check_password("1234567").is_err());
    }
}
