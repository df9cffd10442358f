//! # Tenants API Handlers
//!
//! Tenant listing and management. Super admins see and manage every tenant;
//! other users only see their own, and tenant admins may edit it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, forbidden};
use crate::handlers::types::{DataResponse, MessageResponse, PageQuery, PaginatedResponse};
use crate::handlers::users::UserResponse;
use crate::models::tenant::{self, API_PLAN_TYPES, STATUSES};
use crate::repositories::page::{PageFilter, PageSortField};
use crate::repositories::tenant::{NewTenant, TenantChanges};
use crate::repositories::{
    PageRepository, Pagination, PromptRepository, SortDirection, TenantRepository,
    UserRepository,
};
use crate::server::AppState;
use crate::validation::FieldErrors;

/// Tenant representation returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantResponse {
    #[schema(value_type = String, example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    #[schema(example = "Acme Corp")]
    pub name: String,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    #[schema(example = "starter")]
    pub plan_type: String,
    pub tokens_monthly_limit: i64,
    pub tokens_used_current: i64,
    pub remaining_tokens: i64,
    pub usage_percent: f64,
    #[schema(example = "2026-03")]
    pub usage_period: String,
    #[schema(example = "active")]
    pub status: String,
    pub theme_config: Option<Value>,
    pub brand_config: Option<Value>,
    pub features: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<tenant::Model> for TenantResponse {
    fn from(model: tenant::Model) -> Self {
        Self {
            remaining_tokens: model.remaining_tokens(),
            usage_percent: model.usage_percent(),
            id: model.id,
            name: model.name,
            domain: model.domain,
            subdomain: model.subdomain,
            plan_type: model.plan_type,
            tokens_monthly_limit: model.tokens_monthly_limit,
            tokens_used_current: model.tokens_used_current,
            usage_period: model.usage_period,
            status: model.status,
            theme_config: model.theme_config,
            brand_config: model.brand_config,
            features: model.features,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Compact tenant reference embedded in user-facing responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantSummary {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub name: String,
    pub subdomain: Option<String>,
    pub plan_type: String,
    pub status: String,
}

impl From<&tenant::Model> for TenantSummary {
    fn from(model: &tenant::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            subdomain: model.subdomain.clone(),
            plan_type: model.plan_type.clone(),
            status: model.status.clone(),
        }
    }
}

/// Tenant list entry with related row counts
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantListItem {
    #[serde(flatten)]
    pub tenant: TenantResponse,
    pub users_count: u64,
    pub pages_count: u64,
    pub generations_count: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PageBrief {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub url_path: String,
    pub keyword: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromptBrief {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub is_active: bool,
}

/// Tenant with its users, pages and prompts
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantDetail {
    #[serde(flatten)]
    pub tenant: TenantResponse,
    pub users: Vec<UserResponse>,
    pub pages: Vec<PageBrief>,
    pub prompts: Vec<PromptBrief>,
    pub generations_count: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTenantRequest {
    #[schema(example = "Acme Corp")]
    pub name: String,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    /// One of `free`, `pro`, `enterprise`
    #[schema(example = "pro")]
    pub plan_type: String,
    #[schema(example = 50000)]
    pub tokens_monthly_limit: i64,
    pub status: Option<String>,
    pub theme_config: Option<Value>,
    pub brand_config: Option<Value>,
    pub features: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub plan_type: Option<String>,
    pub tokens_monthly_limit: Option<i64>,
    pub status: Option<String>,
    pub theme_config: Option<Value>,
    pub brand_config: Option<Value>,
    pub features: Option<String>,
}

fn check_json_object(errors: &mut FieldErrors, field: &str, value: Option<&Value>) {
    if let Some(value) = value
        && !value.is_object()
    {
        errors.add(field, format!("The {field} field must be an object."));
    }
}

fn check_host_fields(errors: &mut FieldErrors, domain: Option<&str>, subdomain: Option<&str>) {
    errors.optional_max_chars("domain", domain, 255);
    errors.optional_max_chars("subdomain", subdomain, 100);
}

/// List tenants with usage counts
#[utoipa::path(
    get,
    path = "/api/v1/tenants",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Paginated tenants", body = PaginatedResponse<TenantListItem>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<TenantListItem>>, ApiError> {
    let repo = TenantRepository::new(&state.db);

    let scope = if auth.is_super_admin() {
        None
    } else {
        match auth.user.tenant_id {
            Some(id) => Some(id),
            None => return Err(forbidden(Some("No tenant access"))),
        }
    };

    let paged = repo.list(scope, query.pagination()).await?;
    let mut items = Vec::with_capacity(paged.items.len());
    for tenant in &paged.items {
        let counts = repo.counts(tenant.id).await?;
        items.push((tenant.clone(), counts));
    }

    let paged = crate::repositories::Paged {
        items,
        total: paged.total,
        page: paged.page,
        per_page: paged.per_page,
    };
    Ok(Json(PaginatedResponse::from_paged(paged, |(tenant, counts)| {
        TenantListItem {
            tenant: tenant.into(),
            users_count: counts.users,
            pages_count: counts.pages,
            generations_count: counts.generations,
        }
    })))
}

/// Create a tenant
#[utoipa::path(
    post,
    path = "/api/v1/tenants",
    security(("bearer_auth" = [])),
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created", body = MessageResponse<TenantResponse>, headers(
            ("Location", description = "URL of the created tenant")
        )),
        (status = 403, description = "Super admin access required", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<CreateTenantRequest>,
) -> Result<
    (
        StatusCode,
        [(&'static str, String); 1],
        Json<MessageResponse<TenantResponse>>,
    ),
    ApiError,
> {
    auth.ensure_super_admin()?;

    let mut errors = FieldErrors::new();
    errors.text("name", &request.name, 255);
    check_host_fields(
        &mut errors,
        request.domain.as_deref(),
        request.subdomain.as_deref(),
    );
    errors.one_of("plan_type", Some(request.plan_type.as_str()), API_PLAN_TYPES);
    errors.min("tokens_monthly_limit", Some(request.tokens_monthly_limit), 0);
    errors.one_of("status", request.status.as_deref(), STATUSES);
    check_json_object(&mut errors, "theme_config", request.theme_config.as_ref());
    check_json_object(&mut errors, "brand_config", request.brand_config.as_ref());
    errors.finish()?;

    let tenant = TenantRepository::new(&state.db)
        .create(NewTenant {
            name: request.name.trim().to_string(),
            domain: request.domain,
            subdomain: request.subdomain,
            plan_type: request.plan_type,
            tokens_monthly_limit: request.tokens_monthly_limit,
            status: request.status,
            theme_config: request.theme_config,
            brand_config: request.brand_config,
            features: request.features,
        })
        .await?;
    tracing::info!(tenant_id = %tenant.id, created_by = %auth.id(), "Tenant created");

    let location = format!("/api/v1/tenants/{}", tenant.id);
    Ok((
        StatusCode::CREATED,
        [("Location", location)],
        Json(MessageResponse::new("Tenant created successfully", tenant.into())),
    ))
}

/// Get a tenant with its users, pages and prompts
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant UUID")),
    responses(
        (status = 200, description = "Tenant details", body = DataResponse<TenantDetail>),
        (status = 403, description = "Not a member of this tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<DataResponse<TenantDetail>>, ApiError> {
    let tenants = TenantRepository::new(&state.db);
    let tenant = tenants.get(tenant_id).await?;
    auth.ensure_tenant(tenant.id)?;

    let users = UserRepository::new(&state.db)
        .list_for_tenant(tenant.id)
        .await?;
    let pages = PageRepository::new(&state.db)
        .list(
            tenant.id,
            PageFilter::default(),
            PageSortField::default(),
            SortDirection::Desc,
            Pagination::new(Some(1), Some(crate::repositories::MAX_PER_PAGE)),
        )
        .await?;
    let prompts = PromptRepository::new(&state.db)
        .list_for_tenant(tenant.id)
        .await?;
    let counts = tenants.counts(tenant.id).await?;

    Ok(Json(DataResponse {
        data: TenantDetail {
            tenant: tenant.into(),
            users: users.into_iter().map(UserResponse::from).collect(),
            pages: pages
                .items
                .into_iter()
                .map(|p| PageBrief {
                    id: p.page.id,
                    url_path: p.page.url_path,
                    keyword: p.page.keyword,
                    status: p.page.status,
                })
                .collect(),
            prompts: prompts
                .into_iter()
                .map(|p| PromptBrief {
                    id: p.id,
                    name: p.name,
                    category: p.category,
                    is_active: p.is_active,
                })
                .collect(),
            generations_count: counts.generations,
        },
    }))
}

/// Update a tenant
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant UUID")),
    request_body = UpdateTenantRequest,
    responses(
        (status = 200, description = "Tenant updated", body = MessageResponse<TenantResponse>),
        (status = 403, description = "Insufficient permissions", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<UpdateTenantRequest>,
) -> Result<Json<MessageResponse<TenantResponse>>, ApiError> {
    let tenants = TenantRepository::new(&state.db);
    let tenant = tenants.get(tenant_id).await?;

    let may_edit = auth.is_super_admin()
        || (auth.user.tenant_id == Some(tenant.id) && auth.user.is_tenant_admin());
    if !may_edit {
        return Err(forbidden(Some("You cannot modify this tenant")));
    }
    let touches_billing = request.plan_type.is_some()
        || request.tokens_monthly_limit.is_some()
        || request.status.is_some();
    if touches_billing && !auth.is_super_admin() {
        return Err(forbidden(Some(
            "Only platform administrators can change plan, token limit or status",
        )));
    }

    let mut errors = FieldErrors::new();
    if let Some(name) = request.name.as_deref() {
        errors.text("name", name, 255);
    }
    check_host_fields(
        &mut errors,
        request.domain.as_deref(),
        request.subdomain.as_deref(),
    );
    errors.one_of("plan_type", request.plan_type.as_deref(), API_PLAN_TYPES);
    errors.min("tokens_monthly_limit", request.tokens_monthly_limit, 0);
    errors.one_of("status", request.status.as_deref(), STATUSES);
    check_json_object(&mut errors, "theme_config", request.theme_config.as_ref());
    check_json_object(&mut errors, "brand_config", request.brand_config.as_ref());
    errors.finish()?;

    let updated = tenants
        .update(
            tenant.id,
            TenantChanges {
                name: request.name.map(|n| n.trim().to_string()),
                domain: request.domain,
                subdomain: request.subdomain,
                plan_type: request.plan_type,
                tokens_monthly_limit: request.tokens_monthly_limit,
                status: request.status,
                theme_config: request.theme_config,
                brand_config: request.brand_config,
                features: request.features,
            },
        )
        .await?;
    tracing::info!(%tenant_id, updated_by = %auth.id(), "Tenant updated");

    Ok(Json(MessageResponse::new(
        "Tenant updated successfully",
        updated.into(),
    )))
}

/// Delete a tenant and its scoped data
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Tenant UUID")),
    responses(
        (status = 204, description = "Tenant deleted"),
        (status = 403, description = "Super admin access required", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError),
        (status = 422, description = "Tenant still has active users", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn delete_tenant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tenant_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.ensure_super_admin()?;
    TenantRepository::new(&state.db).delete(tenant_id).await?;
    tracing::info!(%tenant_id, deleted_by = %auth.id(), "Tenant deleted");
    Ok(StatusCode::NO_CONTENT)
}
