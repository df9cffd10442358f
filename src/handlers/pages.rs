//! # Pages API Handlers
//!
//! CRUD for the tenant's target pages.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthUser, TenantContext};
use crate::error::ApiError;
use crate::handlers::types::{
    DataResponse, MessageResponse, PaginatedResponse, non_empty, parse_sort, scoped_tenant,
};
use crate::models::content_generation::GenerationStatus;
use crate::models::page::{self, CMS_TYPES, STATUSES, success_rate};
use crate::repositories::page::{NewPage, PageChanges, PageFilter, PageSortField};
use crate::repositories::{PageRepository, Pagination};
use crate::server::AppState;
use crate::validation::FieldErrors;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageResponse {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub tenant_id: Uuid,
    #[schema(example = "/blog/rust-web-services")]
    pub url_path: String,
    #[schema(example = "rust web services")]
    pub keyword: String,
    pub category: Option<String>,
    #[schema(example = "en")]
    pub language: String,
    pub cms_type: Option<String>,
    pub cms_page_id: Option<String>,
    #[schema(example = "draft")]
    pub status: String,
    #[schema(example = 5)]
    pub priority: i32,
    #[schema(example = "Normal")]
    pub priority_text: String,
    pub metadata: Option<Value>,
    pub last_synced: Option<String>,
    /// Present on list and detail responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generations_count: Option<u64>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<page::Model> for PageResponse {
    fn from(model: page::Model) -> Self {
        Self {
            priority_text: model.priority_text().to_string(),
            id: model.id,
            tenant_id: model.tenant_id,
            url_path: model.url_path,
            keyword: model.keyword,
            category: model.category,
            language: model.language,
            cms_type: model.cms_type,
            cms_page_id: model.cms_page_id,
            status: model.status,
            priority: model.priority,
            metadata: model.metadata,
            last_synced: model.last_synced.map(|dt| dt.to_rfc3339()),
            generations_count: None,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Generation row as listed on a page
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageGeneration {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub prompt_type: String,
    pub status: String,
    pub tokens_used: i64,
    pub ai_model: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageDetail {
    #[serde(flatten)]
    pub page: PageResponse,
    pub generations: Vec<PageGeneration>,
    /// Completed generations as a percentage of all generations
    pub success_rate: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPagesQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    /// Substring of url_path or keyword
    pub search: Option<String>,
    /// created_at, updated_at, url_path, keyword, priority or status
    pub sort_by: Option<String>,
    /// asc or desc
    pub sort_direction: Option<String>,
    /// Super admins only: list another tenant's pages
    pub tenant_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePageRequest {
    pub url_path: String,
    pub keyword: String,
    pub category: Option<String>,
    pub language: Option<String>,
    pub cms_type: Option<String>,
    pub cms_page_id: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i32>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePageRequest {
    pub url_path: Option<String>,
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub cms_type: Option<String>,
    pub cms_page_id: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i32>,
    pub metadata: Option<Value>,
}

struct PageFields<'a> {
    category: Option<&'a str>,
    language: Option<&'a str>,
    cms_type: Option<&'a str>,
    cms_page_id: Option<&'a str>,
    status: Option<&'a str>,
    priority: Option<i32>,
    metadata: Option<&'a Value>,
}

fn check_optional_fields(errors: &mut FieldErrors, fields: PageFields<'_>) {
    errors.optional_max_chars("category", fields.category, 100);
    if let Some(language) = fields.language
        && language.chars().count() != 2
    {
        errors.add("language", "The language field must be 2 characters.");
    }
    errors.one_of("cms_type", fields.cms_type, CMS_TYPES);
    errors.optional_max_chars("cms_page_id", fields.cms_page_id, 255);
    errors.one_of("status", fields.status, STATUSES);
    errors.range("priority", fields.priority, 1, 10);
    if let Some(metadata) = fields.metadata
        && !metadata.is_object()
    {
        errors.add("metadata", "The metadata field must be an object.");
    }
}

async fn load_page(
    state: &AppState,
    auth: &AuthUser,
    page_id: Uuid,
) -> Result<page::Model, ApiError> {
    let page = PageRepository::new(&state.db).get(page_id).await?;
    auth.ensure_tenant(page.tenant_id)?;
    Ok(page)
}

/// List pages
#[utoipa::path(
    get,
    path = "/api/v1/pages",
    security(("bearer_auth" = [])),
    params(ListPagesQuery),
    responses(
        (status = 200, description = "Paginated pages", body = PaginatedResponse<PageResponse>),
        (status = 400, description = "Invalid sort parameters", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn list_pages(
    State(state): State<AppState>,
    auth: AuthUser,
    ctx: TenantContext,
    Query(query): Query<ListPagesQuery>,
) -> Result<Json<PaginatedResponse<PageResponse>>, ApiError> {
    let (sort, direction) = parse_sort(
        query.sort_by.as_deref(),
        query.sort_direction.as_deref(),
        PageSortField::parse,
    )?;
    let tenant_id = scoped_tenant(&auth, &ctx, query.tenant_id);

    let filter = PageFilter {
        status: non_empty(query.status),
        category: non_empty(query.category),
        language: non_empty(query.language),
        search: non_empty(query.search),
    };
    let paged = PageRepository::new(&state.db)
        .list(
            tenant_id,
            filter,
            sort,
            direction,
            Pagination::new(query.page, query.per_page),
        )
        .await?;

    Ok(Json(PaginatedResponse::from_paged(paged, |item| {
        let mut response = PageResponse::from(item.page);
        response.generations_count = Some(item.generations_count);
        response
    })))
}

/// Create a page
#[utoipa::path(
    post,
    path = "/api/v1/pages",
    security(("bearer_auth" = [])),
    request_body = CreatePageRequest,
    responses(
        (status = 201, description = "Page created", body = MessageResponse<PageResponse>),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn create_page(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<CreatePageRequest>,
) -> Result<(StatusCode, Json<MessageResponse<PageResponse>>), ApiError> {
    let mut errors = FieldErrors::new();
    errors.text("url_path", &request.url_path, 500);
    errors.text("keyword", &request.keyword, 255);
    check_optional_fields(
        &mut errors,
        PageFields {
            category: request.category.as_deref(),
            language: request.language.as_deref(),
            cms_type: request.cms_type.as_deref(),
            cms_page_id: request.cms_page_id.as_deref(),
            status: request.status.as_deref(),
            priority: request.priority,
            metadata: request.metadata.as_ref(),
        },
    );
    errors.finish()?;

    let page = PageRepository::new(&state.db)
        .create(
            ctx.id(),
            NewPage {
                url_path: request.url_path.trim().to_string(),
                keyword: request.keyword.trim().to_string(),
                category: request.category,
                language: request.language,
                cms_type: request.cms_type,
                cms_page_id: request.cms_page_id,
                status: request.status,
                priority: request.priority,
                metadata: request.metadata,
            },
        )
        .await?;
    tracing::info!(page_id = %page.id, tenant_id = %ctx.id(), "Page created");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Page created successfully", page.into())),
    ))
}

/// Get a page with its generations
#[utoipa::path(
    get,
    path = "/api/v1/pages/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Page UUID")),
    responses(
        (status = 200, description = "Page", body = DataResponse<PageDetail>),
        (status = 403, description = "Page belongs to another tenant", body = ApiError),
        (status = 404, description = "Page not found", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn get_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
) -> Result<Json<DataResponse<PageDetail>>, ApiError> {
    let page = load_page(&state, &auth, page_id).await?;
    let generations = PageRepository::new(&state.db).generations(page.id).await?;

    let total = generations.len() as u64;
    let completed = generations
        .iter()
        .filter(|g| g.status == GenerationStatus::Completed.as_str())
        .count() as u64;

    let mut response = PageResponse::from(page);
    response.generations_count = Some(total);

    Ok(Json(DataResponse {
        data: PageDetail {
            page: response,
            success_rate: success_rate(completed, total),
            generations: generations
                .into_iter()
                .map(|g| PageGeneration {
                    id: g.id,
                    prompt_type: g.prompt_type,
                    status: g.status,
                    tokens_used: g.tokens_used,
                    ai_model: g.ai_model,
                    created_at: g.created_at.to_rfc3339(),
                })
                .collect(),
        },
    }))
}

/// Update a page
#[utoipa::path(
    put,
    path = "/api/v1/pages/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Page UUID")),
    request_body = UpdatePageRequest,
    responses(
        (status = 200, description = "Page updated", body = MessageResponse<PageResponse>),
        (status = 403, description = "Page belongs to another tenant", body = ApiError),
        (status = 404, description = "Page not found", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn update_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
    Json(request): Json<UpdatePageRequest>,
) -> Result<Json<MessageResponse<PageResponse>>, ApiError> {
    let page = load_page(&state, &auth, page_id).await?;

    let mut errors = FieldErrors::new();
    if let Some(url_path) = request.url_path.as_deref() {
        errors.text("url_path", url_path, 500);
    }
    if let Some(keyword) = request.keyword.as_deref() {
        errors.text("keyword", keyword, 255);
    }
    check_optional_fields(
        &mut errors,
        PageFields {
            category: request.category.as_deref(),
            language: request.language.as_deref(),
            cms_type: request.cms_type.as_deref(),
            cms_page_id: request.cms_page_id.as_deref(),
            status: request.status.as_deref(),
            priority: request.priority,
            metadata: request.metadata.as_ref(),
        },
    );
    errors.finish()?;

    let updated = PageRepository::new(&state.db)
        .update(
            page,
            PageChanges {
                url_path: request.url_path.map(|v| v.trim().to_string()),
                keyword: request.keyword.map(|v| v.trim().to_string()),
                category: request.category,
                language: request.language,
                cms_type: request.cms_type,
                cms_page_id: request.cms_page_id,
                status: request.status,
                priority: request.priority,
                metadata: request.metadata,
            },
        )
        .await?;

    Ok(Json(MessageResponse::new(
        "Page updated successfully",
        updated.into(),
    )))
}

/// Delete a page without generations
#[utoipa::path(
    delete,
    path = "/api/v1/pages/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Page UUID")),
    responses(
        (status = 204, description = "Page deleted"),
        (status = 403, description = "Page belongs to another tenant", body = ApiError),
        (status = 404, description = "Page not found", body = ApiError),
        (status = 422, description = "Page has generations", body = ApiError)
    ),
    tag = "pages"
)]
pub async fn delete_page(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(page_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let page = load_page(&state, &auth, page_id).await?;
    PageRepository::new(&state.db).delete(page).await?;
    tracing::info!(%page_id, "Page deleted");
    Ok(StatusCode::NO_CONTENT)
}
