use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::get,
};
use serde_json::{Value, json};
use tracing::info;

use super::{AppRouter, message};
use crate::auth::AuthUser;
use crate::db::ServiceChanges;
use crate::error::{ApiError, ApiResult};
use crate::models::{Service, UserType};
use crate::state::AppState;
use crate::uploads::{Folder, MultipartForm, UploadKind};

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_services).post(create_service))
        .route(
            "/:id",
            get(get_service).put(update_service).patch(update_service).delete(delete_service),
        )
}

fn service_changes(form: &MultipartForm) -> ApiResult<ServiceChanges> {
    Ok(ServiceChanges {
        name: form.text("name"),
        description: form.text("description"),
        price: form.price("price")?,
        image_url: None,
    })
}

async fn create_service(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    caller.require(&state, &[UserType::Admin]).await?;

    let form = MultipartForm::read(multipart, "image", state.uploads.max_bytes()).await?;
    let mut changes = service_changes(&form)?;
    if changes.name.is_none() {
        return Err(ApiError::bad_request("name is required"));
    }

    if let Some(file) = &form.file {
        let stored = state.uploads.store(Folder::Services, file, UploadKind::Image).await?;
        changes.image_url = Some(stored.public_url);
    }

    let result = state.db.create_service(&changes).await;
    if let (Err(_), Some(url)) = (&result, &changes.image_url) {
        state.uploads.remove_url(url).await;
    }
    let service = result?;

    info!("Created service {}", service.service_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Service created successfully",
            "id": service.service_id,
        })),
    ))
}

async fn list_services(State(state): State<Arc<AppState>>, _caller: AuthUser) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(state.db.get_services().await?))
}

async fn get_service(State(state): State<Arc<AppState>>, _caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Service>> {
    let service = state
        .db
        .get_service(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    Ok(Json(service))
}

async fn update_service(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let existing = state
        .db
        .get_service(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    let form = MultipartForm::read(multipart, "image", state.uploads.max_bytes()).await?;
    let mut changes = service_changes(&form)?;
    if let Some(file) = &form.file {
        let stored = state.uploads.store(Folder::Services, file, UploadKind::Image).await?;
        changes.image_url = Some(stored.public_url);
    }

    let result = state.db.update_service(id, &changes).await;
    let replaced = matches!(result, Ok(Some(_)));
    match (&changes.image_url, &existing.image_url) {
        (Some(new), _) if !replaced => state.uploads.remove_url(new).await,
        (Some(_), Some(old)) => state.uploads.remove_url(old).await,
        _ => {}
    }
    let service = result?.ok_or_else(|| ApiError::not_found("Service not found"))?;

    info!("Updated service {id}");

    Ok(Json(json!({
        "message": "Service updated successfully",
        "service": service,
    })))
}

async fn delete_service(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let service = state
        .db
        .delete_service(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    if let Some(url) = &service.image_url {
        state.uploads.remove_url(url).await;
    }
    info!("Deleted service {id}");

    Ok(message("Service deleted successfully"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::StatusCode;

    use super::*;
    use crate::routes::testing::{TestApp, get_request};

    #[test]
    fn form_fields_map_to_changes() {
        let form = MultipartForm {
            fields: HashMap::from([
                ("name".to_string(), " Logo design ".to_string()),
                ("price".to_string(), "null".to_string()),
            ]),
            file: None,
        };

        let changes = service_changes(&form).unwrap();
        assert_eq!(changes.name.as_deref(), Some("Logo design"));
        assert_eq!(changes.description, None);
        assert_eq!(changes.price, None);
    }

    #[tokio::test]
    async fn service_routes_require_a_token() {
        let app = TestApp::new();

        let (status, _) = app.send(get_request("/api/v1/services", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.send(get_request("/api/v1/services/3", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
