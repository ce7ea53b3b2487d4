use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{AppRouter, JsonBody, QueryParams, message, optional};
use crate::auth::AuthUser;
use crate::db::FileChanges;
use crate::error::{ApiError, ApiResult};
use crate::models::{FileUpload, UserType};
use crate::state::AppState;
use crate::uploads::{Folder, MultipartForm, UploadKind, in_folder};

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_files).post(create_file))
        .route("/upload", post(upload_file))
        .route("/:id", get(get_file).put(update_file).delete(delete_file))
}

#[derive(Deserialize)]
struct FileRequest {
    filename: Option<String>,
    file_url: Option<String>,
    project_id: Option<i32>,
    order_id: Option<i32>,
}

impl FileRequest {
    fn into_changes(self) -> FileChanges {
        FileChanges {
            filename: optional(self.filename),
            file_url: optional(self.file_url),
            project_id: self.project_id,
            order_id: self.order_id,
        }
    }
}

#[derive(Deserialize)]
struct FileQuery {
    project_id: Option<i32>,
    order_id: Option<i32>,
}

/// Linked project and order must exist before metadata points at them
async fn check_links(state: &AppState, changes: &FileChanges) -> ApiResult<()> {
    if let Some(project_id) = changes.project_id {
        if state.db.get_project(project_id).await?.is_none() {
            return Err(ApiError::not_found("Project not found"));
        }
    }
    if let Some(order_id) = changes.order_id {
        if state.db.get_order(order_id).await?.is_none() {
            return Err(ApiError::not_found("Order not found"));
        }
    }
    Ok(())
}

async fn create_file(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    JsonBody(body): JsonBody<FileRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    caller.require(&state, &[UserType::Admin]).await?;

    let changes = body.into_changes();
    if changes.filename.is_none() || changes.file_url.is_none() {
        return Err(ApiError::bad_request("filename and file_url are required"));
    }
    check_links(&state, &changes).await?;

    let file = state.db.create_file(&changes).await?;
    info!("Recorded file {} ({})", file.file_id, file.filename);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File recorded successfully",
            "file_id": file.file_id,
        })),
    ))
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    caller.require(&state, &[UserType::Admin, UserType::Staff]).await?;

    let form = MultipartForm::read(multipart, "file", state.uploads.max_bytes()).await?;
    let upload = form
        .file
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("file is required"))?;

    let mut changes = FileChanges {
        filename: Some(upload.file_name.clone()),
        file_url: None,
        project_id: form.id("project_id")?,
        order_id: form.id("order_id")?,
    };
    check_links(&state, &changes).await?;

    let stored = state.uploads.store(Folder::Files, upload, UploadKind::Document).await?;
    changes.file_url = Some(stored.public_url.clone());

    let result = state.db.create_file(&changes).await;
    if result.is_err() {
        state.uploads.remove_url(&stored.public_url).await;
    }
    let file = result?;

    info!("Uploaded file {} to {}", file.file_id, file.file_url);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File uploaded successfully",
            "file": file,
        })),
    ))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    QueryParams(query): QueryParams<FileQuery>,
) -> ApiResult<Json<Vec<FileUpload>>> {
    Ok(Json(state.db.get_files(query.project_id, query.order_id).await?))
}

async fn get_file(State(state): State<Arc<AppState>>, _caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<FileUpload>> {
    let file = state
        .db
        .get_file(id)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    Ok(Json(file))
}

async fn update_file(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    JsonBody(body): JsonBody<FileRequest>,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let changes = body.into_changes();
    check_links(&state, &changes).await?;

    let file = state
        .db
        .update_file(id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    Ok(Json(json!({
        "message": "File updated successfully",
        "file": file,
    })))
}

async fn delete_file(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    let file = state
        .db
        .delete_file(id)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    // only files uploaded through this route are ours to remove
    if in_folder(&file.file_url, Folder::Files) {
        state.uploads.remove_url(&file.file_url).await;
    }
    info!("Deleted file {id}");

    Ok(message("File deleted successfully"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::routes::testing::{TestApp, get_request, json_request};

    #[test]
    fn blank_metadata_is_treated_as_missing() {
        let changes = FileRequest {
            filename: Some(" ".to_string()),
            file_url: Some("https://cdn.example.com/proof.pdf".to_string()),
            project_id: Some(2),
            order_id: None,
        }
        .into_changes();

        assert_eq!(changes.filename, None);
        assert_eq!(changes.file_url.as_deref(), Some("https://cdn.example.com/proof.pdf"));
        assert_eq!(changes.project_id, Some(2));
    }

    #[tokio::test]
    async fn file_routes_require_a_token() {
        let app = TestApp::new();

        let (status, _) = app.send(get_request("/api/v1/files?project_id=1", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(json_request(
                "POST",
                "/api/v1/files",
                None,
                json!({ "filename": "proof.pdf", "file_url": "/static/uploads/files/proof.pdf" }),
            ))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_filters_are_rejected() {
        let app = TestApp::new();
        let token = app.token(1, crate::auth::TokenKind::Access);

        let (status, _) = app.send(get_request("/api/v1/files?order_id=latest", Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
