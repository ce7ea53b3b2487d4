use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{AppRouter, JsonBody, message, non_negative, optional, parse_date, required};
use crate::auth::AuthUser;
use crate::db::ProjectChanges;
use crate::error::{ApiError, ApiResult};
use crate::models::{Project, User, UserType};
use crate::state::AppState;

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).patch(update_project).delete(delete_project),
        )
}

#[derive(Deserialize)]
struct ProjectRequest {
    client_id: Option<i32>,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    status: Option<String>,
    deadline: Option<String>,
    price: Option<f64>,
    payment_status: Option<String>,
    delivery_status: Option<String>,
}

impl ProjectRequest {
    fn into_changes(self) -> ApiResult<ProjectChanges> {
        let deadline = optional(self.deadline)
            .map(|raw| parse_date(&raw, "deadline"))
            .transpose()?;
        let price = self.price.map(|p| non_negative(p, "price")).transpose()?;

        Ok(ProjectChanges {
            client_id: self.client_id,
            title: optional(self.title),
            description: optional(self.description),
            category: optional(self.category),
            status: optional(self.status),
            deadline,
            price,
            payment_status: optional(self.payment_status),
            delivery_status: optional(self.delivery_status),
        })
    }
}

/// Staff see every project, a client account sees those of its linked client record
async fn visible_projects(state: &AppState, user: &User) -> ApiResult<Vec<Project>> {
    if user.role().is_some_and(|r| r.is_privileged()) {
        return Ok(state.db.get_projects().await?);
    }

    match state.db.get_client_for_user(user.user_id).await? {
        Some(client) => Ok(state.db.get_projects_by_client(client.client_id).await?),
        None => Ok(Vec::new()),
    }
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    JsonBody(body): JsonBody<ProjectRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    caller.require(&state, &[UserType::Admin, UserType::Staff]).await?;

    let client_id = body
        .client_id
        .ok_or_else(|| ApiError::bad_request("client_id is required"))?;
    required(body.title.clone(), "title")?;
    let changes = body.into_changes()?;

    if state.db.get_client(client_id).await?.is_none() {
        return Err(ApiError::not_found("Client not found"));
    }

    let project = state.db.create_project(&changes).await?;
    info!("Created project {} for client {}", project.project_id, client_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Project created successfully",
            "project_id": project.project_id,
        })),
    ))
}

async fn list_projects(State(state): State<Arc<AppState>>, caller: AuthUser) -> ApiResult<Json<Vec<Project>>> {
    let user = caller.load(&state).await?;
    Ok(Json(visible_projects(&state, &user).await?))
}

async fn get_project(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Project>> {
    let user = caller.load(&state).await?;

    let project = state
        .db
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    if !user.role().is_some_and(|r| r.is_privileged()) {
        let own_client = state.db.get_client_for_user(user.user_id).await?;
        if own_client.map(|c| c.client_id) != Some(project.client_id) {
            return Err(ApiError::forbidden("You do not have access to this project"));
        }
    }

    Ok(Json(project))
}

async fn update_project(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    JsonBody(body): JsonBody<ProjectRequest>,
) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin, UserType::Staff]).await?;

    let changes = body.into_changes()?;
    if let Some(client_id) = changes.client_id {
        if state.db.get_client(client_id).await?.is_none() {
            return Err(ApiError::not_found("Client not found"));
        }
    }

    let project = state
        .db
        .update_project(id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    Ok(Json(json!({
        "message": "Project updated successfully",
        "project": project,
    })))
}

async fn delete_project(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    caller.require(&state, &[UserType::Admin]).await?;

    if !state.db.delete_project(id).await? {
        return Err(ApiError::not_found("Project not found"));
    }
    info!("Deleted project {id}");

    Ok(message("Project deleted successfully"))
}
