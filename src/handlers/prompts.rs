//! # Prompts API Handlers
//!
//! Tenant prompt templates. System prompts are shared read-only with every
//! tenant; only super admins edit them and nobody deletes them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthUser, TenantContext};
use crate::error::{ApiError, forbidden};
use crate::handlers::types::{
    DataResponse, MessageResponse, PaginatedResponse, non_empty, parse_sort, scoped_tenant,
};
use crate::models::prompt;
use crate::repositories::prompt::{NewPrompt, PromptChanges, PromptFilter, PromptSortField};
use crate::repositories::{Pagination, PromptRepository};
use crate::server::AppState;
use crate::templating::extract_placeholders;
use crate::validation::FieldErrors;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromptResponse {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub tenant_id: Uuid,
    #[schema(example = "Product description")]
    pub name: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    #[schema(example = "Describe {{product}} for {{audience}}")]
    pub template: String,
    pub variables: Vec<String>,
    pub category: Option<String>,
    /// Type assigned to generations created from this prompt
    #[schema(example = "content")]
    pub prompt_type: String,
    pub is_active: bool,
    pub is_system: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<prompt::Model> for PromptResponse {
    fn from(model: prompt::Model) -> Self {
        Self {
            variables: model.variable_names(),
            prompt_type: model.prompt_type().to_string(),
            id: model.id,
            tenant_id: model.tenant_id,
            name: model.name,
            alias: model.alias,
            description: model.description,
            template: model.template,
            category: model.category,
            is_active: model.is_active,
            is_system: model.is_system,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPromptsQuery {
    /// Also list the shared system prompts
    #[serde(default)]
    pub include_system: bool,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    /// Substring of name, description or alias
    pub search: Option<String>,
    /// created_at, updated_at, name or category
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePromptRequest {
    pub name: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub template: String,
    /// Defaults to the placeholders found in `template`
    pub variables: Option<Vec<String>>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

/// Partial update; `is_system` is not accepted
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePromptRequest {
    pub name: Option<String>,
    /// `null` or an empty string removes the alias
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub alias: Option<Option<String>>,
    pub description: Option<String>,
    pub template: Option<String>,
    pub variables: Option<Vec<String>>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

fn check_optional_fields(
    errors: &mut FieldErrors,
    alias: Option<&str>,
    description: Option<&str>,
    category: Option<&str>,
) {
    errors.optional_max_chars("alias", alias, 100);
    errors.optional_max_chars("description", description, 1000);
    errors.optional_max_chars("category", category, 100);
}

/// List prompts
#[utoipa::path(
    get,
    path = "/api/v1/prompts",
    security(("bearer_auth" = [])),
    params(ListPromptsQuery),
    responses(
        (status = 200, description = "Paginated prompts", body = PaginatedResponse<PromptResponse>),
        (status = 400, description = "Invalid sort parameters", body = ApiError)
    ),
    tag = "prompts"
)]
pub async fn list_prompts(
    State(state): State<AppState>,
    auth: AuthUser,
    ctx: TenantContext,
    Query(query): Query<ListPromptsQuery>,
) -> Result<Json<PaginatedResponse<PromptResponse>>, ApiError> {
    let (sort, direction) = parse_sort(
        query.sort_by.as_deref(),
        query.sort_direction.as_deref(),
        PromptSortField::parse,
    )?;
    let tenant_id = scoped_tenant(&auth, &ctx, query.tenant_id);

    let filter = PromptFilter {
        include_system: query.include_system,
        category: non_empty(query.category),
        is_active: query.is_active,
        search: non_empty(query.search),
    };
    let paged = PromptRepository::new(&state.db)
        .list(
            tenant_id,
            filter,
            sort,
            direction,
            Pagination::new(query.page, query.per_page),
        )
        .await?;
    Ok(Json(PaginatedResponse::from_paged(paged, PromptResponse::from)))
}

/// Create a prompt
#[utoipa::path(
    post,
    path = "/api/v1/prompts",
    security(("bearer_auth" = [])),
    request_body = CreatePromptRequest,
    responses(
        (status = 201, description = "Prompt created", body = MessageResponse<PromptResponse>),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "prompts"
)]
pub async fn create_prompt(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(request): Json<CreatePromptRequest>,
) -> Result<(StatusCode, Json<MessageResponse<PromptResponse>>), ApiError> {
    let mut errors = FieldErrors::new();
    errors.text("name", &request.name, 255);
    errors.required("template", &request.template);
    check_optional_fields(
        &mut errors,
        request.alias.as_deref(),
        request.description.as_deref(),
        request.category.as_deref(),
    );
    errors.finish()?;

    let variables = request
        .variables
        .unwrap_or_else(|| extract_placeholders(&request.template));
    let prompt = PromptRepository::new(&state.db)
        .create(
            ctx.id(),
            NewPrompt {
                name: request.name.trim().to_string(),
                alias: non_empty(request.alias),
                description: request.description,
                template: request.template,
                variables,
                category: request.category,
                is_active: request.is_active.unwrap_or(true),
                is_system: false,
            },
        )
        .await?;
    tracing::info!(prompt_id = %prompt.id, tenant_id = %ctx.id(), "Prompt created");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Prompt created successfully", prompt.into())),
    ))
}

/// Get a prompt
#[utoipa::path(
    get,
    path = "/api/v1/prompts/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Prompt UUID")),
    responses(
        (status = 200, description = "Prompt", body = DataResponse<PromptResponse>),
        (status = 403, description = "Prompt belongs to another tenant", body = ApiError),
        (status = 404, description = "Prompt not found", body = ApiError)
    ),
    tag = "prompts"
)]
pub async fn get_prompt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(prompt_id): Path<Uuid>,
) -> Result<Json<DataResponse<PromptResponse>>, ApiError> {
    let prompt = PromptRepository::new(&state.db).get(prompt_id).await?;
    if !prompt.is_system {
        auth.ensure_tenant(prompt.tenant_id)?;
    }
    Ok(Json(DataResponse { data: prompt.into() }))
}

/// Update a prompt
#[utoipa::path(
    put,
    path = "/api/v1/prompts/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Prompt UUID")),
    request_body = UpdatePromptRequest,
    responses(
        (status = 200, description = "Prompt updated", body = MessageResponse<PromptResponse>),
        (status = 403, description = "Not allowed to modify this prompt", body = ApiError),
        (status = 404, description = "Prompt not found", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "prompts"
)]
pub async fn update_prompt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(prompt_id): Path<Uuid>,
    Json(request): Json<UpdatePromptRequest>,
) -> Result<Json<MessageResponse<PromptResponse>>, ApiError> {
    let prompts = PromptRepository::new(&state.db);
    let prompt = prompts.get(prompt_id).await?;
    if prompt.is_system {
        if !auth.is_super_admin() {
            return Err(forbidden(Some("Only super admins can modify system prompts")));
        }
    } else {
        auth.ensure_tenant(prompt.tenant_id)?;
    }

    let mut errors = FieldErrors::new();
    if let Some(name) = request.name.as_deref() {
        errors.text("name", name, 255);
    }
    if let Some(template) = request.template.as_deref() {
        errors.required("template", template);
    }
    check_optional_fields(
        &mut errors,
        request.alias.as_ref().and_then(|a| a.as_deref()),
        request.description.as_deref(),
        request.category.as_deref(),
    );
    errors.finish()?;

    let updated = prompts
        .update(
            prompt,
            PromptChanges {
                name: request.name.map(|n| n.trim().to_string()),
                alias: request.alias.map(non_empty),
                description: request.description,
                template: request.template,
                variables: request.variables,
                category: request.category,
                is_active: request.is_active,
            },
        )
        .await?;

    Ok(Json(MessageResponse::new(
        "Prompt updated successfully",
        updated.into(),
    )))
}

/// Delete a prompt
#[utoipa::path(
    delete,
    path = "/api/v1/prompts/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Prompt UUID")),
    responses(
        (status = 204, description = "Prompt deleted"),
        (status = 403, description = "Prompt belongs to another tenant", body = ApiError),
        (status = 404, description = "Prompt not found", body = ApiError),
        (status = 422, description = "System prompts cannot be deleted", body = ApiError)
    ),
    tag = "prompts"
)]
pub async fn delete_prompt(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(prompt_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let prompts = PromptRepository::new(&state.db);
    let prompt = prompts.get(prompt_id).await?;
    if !prompt.is_system {
        auth.ensure_tenant(prompt.tenant_id)?;
    }
    prompts.delete(prompt).await?;
    tracing::info!(%prompt_id, "Prompt deleted");
    Ok(StatusCode::NO_CONTENT)
}
