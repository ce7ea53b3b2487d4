//! Product catalogue. Every success body is wrapped as
//! `{"success": true, "message": ..., "data": ...}` for the storefront client.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{AppRouter, QueryParams};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::db::ProductChanges;
use crate::error::{ApiError, ApiResult};
use crate::models::{Product, ProductOwner, User, UserType};
use crate::state::AppState;
use crate::uploads::{Folder, MultipartForm, StoredFile, UploadKind};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

pub fn router() -> AppRouter {
    AppRouter::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).patch(update_product).delete(delete_product),
        )
}

#[derive(Serialize)]
struct ProductView {
    #[serde(flatten)]
    product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<ProductOwner>,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pagination {
    page: i64,
    per_page: i64,
}

impl Pagination {
    fn from_query(query: &PageQuery) -> Self {
        Self {
            page: query.page.unwrap_or(1).max(1),
            per_page: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    fn pages(&self, total: i64) -> i64 {
        (total + self.per_page - 1) / self.per_page
    }
}

fn success(message: &str, data: Option<Value>) -> Json<Value> {
    let mut body = json!({ "success": true, "message": message });
    if let Some(data) = data {
        body["data"] = data;
    }
    Json(body)
}

fn ensure_owner(user: &User, product: &Product, action: &str) -> ApiResult<()> {
    if user.is_admin() || product.user_id == user.user_id {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("You are not authorized to {action} this product")))
    }
}

/// Read the product fields of a form; `require_all` enforces the fields needed on creation
fn product_changes(form: &MultipartForm, require_all: bool) -> ApiResult<ProductChanges> {
    let changes = ProductChanges {
        title: form.text("title"),
        description: form.text("description"),
        category: form.text("category"),
        price: form.price("price")?,
        image: None,
    };

    if require_all && (changes.title.is_none() || changes.description.is_none() || changes.category.is_none()) {
        return Err(ApiError::bad_request("Title, description, and category are required"));
    }

    Ok(changes)
}

async fn store_image(state: &AppState, form: &MultipartForm) -> ApiResult<Option<StoredFile>> {
    match &form.file {
        Some(file) => Ok(Some(state.uploads.store(Folder::Products, file, UploadKind::Image).await?)),
        None => Ok(None),
    }
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = caller.require(&state, &[UserType::Admin, UserType::Staff]).await?;

    let form = MultipartForm::read(multipart, "image", state.uploads.max_bytes()).await?;
    let mut changes = product_changes(&form, true)?;

    let stored = store_image(&state, &form).await?;
    changes.image = stored.as_ref().map(|s| s.public_url.clone());

    let result = state.db.create_product(user.user_id, &changes).await;
    if let (Err(_), Some(stored)) = (&result, &stored) {
        state.uploads.remove_url(&stored.public_url).await;
    }
    let product = result?;

    info!("Product {} created by user {}", product.id, user.user_id);

    Ok((
        StatusCode::CREATED,
        success("Product created successfully", Some(json!({ "product": product }))),
    ))
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> ApiResult<Json<Value>> {
    let pagination = Pagination::from_query(&query);

    let total = state.db.count_products().await?;
    let rows = state.db.get_products_page(pagination.per_page, pagination.offset()).await?;

    let products: Vec<ProductView> = rows
        .into_iter()
        .map(|row| ProductView {
            owner: caller.map(|_| row.owner()),
            product: row.product,
        })
        .collect();

    Ok(success(
        "Products retrieved successfully",
        Some(json!({
            "products": products,
            "meta": {
                "total": total,
                "pages": pagination.pages(total),
                "current_page": pagination.page,
                "per_page": pagination.per_page,
            },
        })),
    ))
}

async fn get_product(State(state): State<Arc<AppState>>, _caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    let row = state
        .db
        .get_product_with_owner(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let view = ProductView {
        owner: Some(row.owner()),
        product: row.product,
    };

    Ok(success("Product details retrieved successfully", Some(json!({ "product": view }))))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let user = caller.load(&state).await?;
    let existing = state
        .db
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    ensure_owner(&user, &existing, "update")?;

    let form = MultipartForm::read(multipart, "image", state.uploads.max_bytes()).await?;
    let mut changes = product_changes(&form, false)?;

    let stored = store_image(&state, &form).await?;
    changes.image = stored.as_ref().map(|s| s.public_url.clone());

    let result = state.db.update_product(id, &changes).await;
    if let (false, Some(stored)) = (matches!(result, Ok(Some(_))), &stored) {
        warn!("Discarding upload for product {id} after a failed update");
        state.uploads.remove_url(&stored.public_url).await;
    }
    let product = result?.ok_or_else(|| ApiError::not_found("Product not found"))?;

    if stored.is_some() {
        if let Some(old) = &existing.image {
            state.uploads.remove_url(old).await;
        }
    }

    info!("Product {id} updated by user {}", user.user_id);

    Ok(success("Product updated successfully", Some(json!({ "product": product }))))
}

async fn delete_product(State(state): State<Arc<AppState>>, caller: AuthUser, Path(id): Path<i32>) -> ApiResult<Json<Value>> {
    let user = caller.load(&state).await?;
    let existing = state
        .db
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    ensure_owner(&user, &existing, "delete")?;

    if let Some(product) = state.db.delete_product(id).await? {
        if let Some(image) = &product.image {
            state.uploads.remove_url(image).await;
        }
    }

    info!("Product {id} deleted by user {}", user.user_id);

    Ok(success("Product has been deleted successfully", None))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use chrono::Utc;

    use super::*;
    use crate::routes::testing::{TestApp, get_request};

    fn form(fields: &[(&str, &str)]) -> MultipartForm {
        MultipartForm {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            file: None,
        }
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        let default = Pagination::from_query(&PageQuery { page: None, limit: None });
        assert_eq!(default, Pagination { page: 1, per_page: 10 });
        assert_eq!(default.offset(), 0);

        let clamped = Pagination::from_query(&PageQuery {
            page: Some(0),
            limit: Some(500),
        });
        assert_eq!(clamped, Pagination { page: 1, per_page: 100 });

        let third = Pagination::from_query(&PageQuery {
            page: Some(3),
            limit: Some(20),
        });
        assert_eq!(third.offset(), 40);
        assert_eq!(third.pages(41), 3);
        assert_eq!(third.pages(40), 2);
        assert_eq!(third.pages(0), 0);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let last = Pagination::from_query(&PageQuery {
            page: Some(i64::MAX),
            limit: Some(10),
        });
        assert_eq!(last.offset(), i64::MAX);

        let negative = Pagination::from_query(&PageQuery {
            page: Some(i64::MIN),
            limit: Some(i64::MIN),
        });
        assert_eq!(negative, Pagination { page: 1, per_page: 1 });
        assert_eq!(negative.offset(), 0);
    }

    #[test]
    fn creation_needs_title_description_and_category() {
        let err = product_changes(&form(&[("title", "Mug"), ("description", " ")]), true).unwrap_err();
        assert_eq!(err.to_string(), "Title, description, and category are required");

        let changes = product_changes(
            &form(&[("title", " Mug "), ("description", "Ceramic"), ("category", "Gifts"), ("price", "")]),
            true,
        )
        .unwrap();
        assert_eq!(changes.title.as_deref(), Some("Mug"));
        assert_eq!(changes.price, None);
    }

    #[test]
    fn non_numeric_price_is_a_validation_error() {
        let err = product_changes(&form(&[("price", "cheap")]), false).unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[test]
    fn only_admins_or_owners_may_modify() {
        let now = Utc::now().naive_utc();
        let product = Product {
            id: 1,
            user_id: 7,
            title: "Mug".to_string(),
            description: None,
            category: None,
            price: 20.0,
            image: None,
            created_at: now,
            updated_at: None,
        };
        let user = |user_id: i32, user_type: &str| User {
            user_id,
            first_name: "Efua".to_string(),
            last_name: "Addo".to_string(),
            email: "efua@example.com".to_string(),
            contact: "0200000001".to_string(),
            image: None,
            biography: None,
            password: String::new(),
            user_type: user_type.to_string(),
            created_at: now,
            updated_at: None,
        };

        assert!(ensure_owner(&user(7, "staff"), &product, "update").is_ok());
        assert!(ensure_owner(&user(1, "admin"), &product, "update").is_ok());
        let err = ensure_owner(&user(8, "staff"), &product, "delete").unwrap_err();
        assert_eq!(err.to_string(), "You are not authorized to delete this product");
    }

    #[tokio::test]
    async fn writes_require_a_token() {
        let app = TestApp::new();

        let request = Request::post("/api/v1/products")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
            .body(Body::from("--X--\r\n"))
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.send(get_request("/api/v1/products/1", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn listing_rejects_malformed_paging() {
        let app = TestApp::new();
        let (status, _) = app.send(get_request("/api/v1/products?page=first", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
