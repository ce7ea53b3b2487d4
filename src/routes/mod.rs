//! HTTP surface: one router per resource, nested under `/api/v1`.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, State},
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use chrono::NaiveDate;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::uploads::PUBLIC_PREFIX;

mod auth;
mod clients;
mod files;
mod orders;
mod payments;
mod products;
mod projects;
mod services;
mod users;

pub type AppRouter = Router<Arc<AppState>>;

/// JSON body whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Query string whose rejections use the API error shape
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

pub fn app(state: Arc<AppState>) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/clients", clients::router())
        .nest("/projects", projects::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/products", products::router())
        .nest("/services", services::router())
        .nest("/files", files::router());

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .nest_service(PUBLIC_PREFIX, ServeDir::new(state.uploads.root()))
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

async fn index() -> &'static str {
    "Kayzonale Prints and Designs Backend API is running"
}

async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.db.ping().await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

/// Trimmed, non-empty value of a required field
pub fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    optional(value).ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

/// Trimmed value, blank treated as absent
pub fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn validate_email(email: &str) -> ApiResult<()> {
    email
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| ApiError::bad_request("Invalid email address"))
}

pub fn parse_date(raw: &str, field: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid {field} format, expected YYYY-MM-DD")))
}

pub fn non_negative(value: f64, field: &str) -> ApiResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ApiError::bad_request(format!("{field} must be a non-negative number")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::auth::TokenKind;

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub router: Router,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let state = crate::state::testing::state(dir.path());
            let router = app(state.clone()).unwrap();
            Self { state, router, _dir: dir }
        }

        pub fn token(&self, user_id: i32, kind: TokenKind) -> String {
            self.state.jwt.issue(user_id, kind).unwrap()
        }

        pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            (status, body)
        }
    }

    pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn root_reports_running() {
        let app = TestApp::new();
        let (status, body) = app.send(get_request("/", None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("Kayzonale Prints and Designs Backend API is running".to_string()));
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let app = TestApp::new();
        let (status, _) = app.send(get_request("/api/v1/nothing-here", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stored_uploads_are_served() {
        let app = TestApp::new();
        let dir = app.state.uploads.root().join("products");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("logo.png"), b"png-bytes").unwrap();

        let (status, body) = app.send(get_request("/static/uploads/products/logo.png", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("png-bytes".to_string()));
    }

    #[test]
    fn field_helpers() {
        assert_eq!(required(Some("  Ama ".to_string()), "first_name").unwrap(), "Ama");
        assert!(required(Some("   ".to_string()), "first_name").is_err());
        assert!(required(None, "first_name").is_err());
        assert_eq!(optional(Some(String::new())), None);

        assert!(validate_email("ama@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());

        assert_eq!(parse_date("2024-02-29", "deadline").unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(parse_date("29/02/2024", "deadline").is_err());

        assert!(non_negative(0.0, "amount").is_ok());
        assert!(non_negative(-1.0, "amount").is_err());
        assert!(non_negative(f64::NAN, "amount").is_err());
    }
}
