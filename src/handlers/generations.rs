//! # Content Generation Handlers
//!
//! Creating a generation either queues it for the background executor
//! (`async`, the default) or runs the same pipeline inside the request
//! (`sync`).

use std::collections::BTreeMap;

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
use crate::error::{ApiError, not_found, quota_exceeded};
use crate::handlers::types::{DataResponse, MessageResponse, PaginatedResponse, non_empty};
use crate::models::content_generation::{self, EXECUTION_MODES, GenerationStatus};
use crate::repositories::content_generation::{
    GenerationContentChanges, GenerationFilter, NewGeneration,
};
use crate::repositories::{
    ContentGenerationRepository, PageRepository, Pagination, PromptRepository,
};
use crate::server::AppState;
use crate::validation::FieldErrors;

const MODE_ASYNC: &str = "async";
const MODE_SYNC: &str = "sync";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GenerationResponse {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub tenant_id: Uuid,
    #[schema(value_type = String)]
    pub page_id: Uuid,
    #[schema(value_type = Option<String>)]
    pub prompt_id: Option<Uuid>,
    #[schema(example = "meta_description")]
    pub prompt_type: String,
    pub prompt_template: String,
    pub variables: Option<Value>,
    pub additional_instructions: Option<String>,
    pub generated_content: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub tokens_used: i64,
    pub ai_model: Option<String>,
    #[schema(example = "async")]
    pub execution_mode: String,
    #[schema(example = "pending")]
    pub status: String,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub published_at: Option<String>,
    pub completed_at: Option<String>,
    #[schema(value_type = Option<String>)]
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<content_generation::Model> for GenerationResponse {
    fn from(model: content_generation::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            page_id: model.page_id,
            prompt_id: model.prompt_id,
            prompt_type: model.prompt_type,
            prompt_template: model.prompt_template,
            variables: model.variables,
            additional_instructions: model.additional_instructions,
            generated_content: model.generated_content,
            meta_title: model.meta_title,
            meta_description: model.meta_description,
            tokens_used: model.tokens_used,
            ai_model: model.ai_model,
            execution_mode: model.execution_mode,
            status: model.status,
            attempts: model.attempts,
            error_message: model.error_message,
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            published_at: model.published_at.map(|dt| dt.to_rfc3339()),
            completed_at: model.completed_at.map(|dt| dt.to_rfc3339()),
            created_by: model.created_by,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGenerationRequest {
    #[schema(value_type = String)]
    pub page_id: Uuid,
    #[schema(value_type = String)]
    pub prompt_id: Uuid,
    /// Values for the prompt's `{{placeholders}}`
    pub variables: Option<BTreeMap<String, String>>,
    pub additional_instructions: Option<String>,
    /// `async` (default) or `sync`
    pub execution_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateGenerationRequest {
    pub generated_content: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListGenerationsQuery {
    pub status: Option<String>,
    pub page_id: Option<Uuid>,
    pub prompt_type: Option<String>,
    /// Substring of the generated content or meta title
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

async fn load_generation(
    state: &AppState,
    auth: &AuthUser,
    generation_id: Uuid,
) -> Result<content_generation::Model, ApiError> {
    let generation = ContentGenerationRepository::new(&state.db)
        .get(generation_id)
        .await?;
    auth.ensure_tenant(generation.tenant_id)?;
    Ok(generation)
}

/// Start a content generation
#[utoipa::path(
    post,
    path = "/api/v1/generations",
    security(("bearer_auth" = [])),
    request_body = CreateGenerationRequest,
    responses(
        (status = 201, description = "Generation queued, or completed in sync mode", body = MessageResponse<GenerationResponse>),
        (status = 404, description = "Page or prompt not found", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError),
        (status = 429, description = "Monthly token limit exhausted", body = ApiError),
        (status = 502, description = "Sync generation failed", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn create_generation(
    State(state): State<AppState>,
    auth: AuthUser,
    ctx: TenantContext,
    Json(request): Json<CreateGenerationRequest>,
) -> Result<(StatusCode, Json<MessageResponse<GenerationResponse>>), ApiError> {
    let mode = request
        .execution_mode
        .clone()
        .unwrap_or_else(|| MODE_ASYNC.to_string());

    let mut errors = FieldErrors::new();
    errors.one_of("execution_mode", Some(mode.as_str()), EXECUTION_MODES);
    errors.optional_max_chars(
        "additional_instructions",
        request.additional_instructions.as_deref(),
        2000,
    );
    if let Some(variables) = &request.variables {
        for (name, value) in variables {
            errors.max_chars(&format!("variables.{name}"), value, 1000);
        }
    }
    errors.finish()?;

    let page = PageRepository::new(&state.db)
        .find_in_tenant(ctx.id(), request.page_id)
        .await?
        .ok_or_else(|| not_found("Page not found"))?;
    let prompt = PromptRepository::new(&state.db)
        .find_usable(ctx.id(), request.prompt_id)
        .await?
        .ok_or_else(|| not_found("Prompt not found"))?;

    if ctx.tenant.remaining_tokens() <= 0 {
        tracing::info!(tenant_id = %ctx.id(), "Generation refused: token quota exhausted");
        return Err(quota_exceeded("Monthly token limit exceeded"));
    }

    let ai_model = state.ai.default_model().await?;
    let sync = mode == MODE_SYNC;
    let generation = ContentGenerationRepository::new(&state.db)
        .create(NewGeneration {
            tenant_id: ctx.id(),
            page_id: page.id,
            prompt_id: prompt.id,
            prompt_type: prompt.prompt_type().to_string(),
            prompt_template: prompt.template.clone(),
            variables: request.variables.map(|vars| serde_json::json!(vars)),
            additional_instructions: non_empty(request.additional_instructions),
            ai_model: Some(ai_model),
            execution_mode: mode,
            status: if sync {
                GenerationStatus::Processing
            } else {
                GenerationStatus::Pending
            },
            created_by: Some(auth.id()),
        })
        .await?;
    tracing::info!(
        generation_id = %generation.id,
        tenant_id = %ctx.id(),
        page_id = %page.id,
        sync,
        "Content generation created"
    );

    if !sync {
        return Ok((
            StatusCode::CREATED,
            Json(MessageResponse::new(
                "Content generation started",
                generation.into(),
            )),
        ));
    }

    let completed = state.executor.run_inline(generation).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "Content generated successfully",
            completed.into(),
        )),
    ))
}

/// List generations
#[utoipa::path(
    get,
    path = "/api/v1/generations",
    security(("bearer_auth" = [])),
    params(ListGenerationsQuery),
    responses(
        (status = 200, description = "Paginated generations", body = PaginatedResponse<GenerationResponse>)
    ),
    tag = "generations"
)]
pub async fn list_generations(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ListGenerationsQuery>,
) -> Result<Json<PaginatedResponse<GenerationResponse>>, ApiError> {
    let filter = GenerationFilter {
        status: non_empty(query.status),
        page_id: query.page_id,
        prompt_type: non_empty(query.prompt_type),
        search: non_empty(query.search),
    };
    let paged = ContentGenerationRepository::new(&state.db)
        .list(ctx.id(), filter, Pagination::new(query.page, query.per_page))
        .await?;
    Ok(Json(PaginatedResponse::from_paged(paged, GenerationResponse::from)))
}

/// Get a generation
#[utoipa::path(
    get,
    path = "/api/v1/generations/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Generation UUID")),
    responses(
        (status = 200, description = "Generation", body = DataResponse<GenerationResponse>),
        (status = 403, description = "Generation belongs to another tenant", body = ApiError),
        (status = 404, description = "Generation not found", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn get_generation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(generation_id): Path<Uuid>,
) -> Result<Json<DataResponse<GenerationResponse>>, ApiError> {
    let generation = load_generation(&state, &auth, generation_id).await?;
    Ok(Json(DataResponse {
        data: generation.into(),
    }))
}

/// Edit the content of a completed generation
#[utoipa::path(
    put,
    path = "/api/v1/generations/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Generation UUID")),
    request_body = UpdateGenerationRequest,
    responses(
        (status = 200, description = "Generation updated", body = MessageResponse<GenerationResponse>),
        (status = 403, description = "Generation belongs to another tenant", body = ApiError),
        (status = 422, description = "Generation is not completed", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn update_generation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(generation_id): Path<Uuid>,
    Json(request): Json<UpdateGenerationRequest>,
) -> Result<Json<MessageResponse<GenerationResponse>>, ApiError> {
    let generation = load_generation(&state, &auth, generation_id).await?;

    let mut errors = FieldErrors::new();
    errors.optional_max_chars("meta_title", request.meta_title.as_deref(), 255);
    errors.optional_max_chars("meta_description", request.meta_description.as_deref(), 500);
    errors.finish()?;

    let updated = ContentGenerationRepository::new(&state.db)
        .update_content(
            generation,
            GenerationContentChanges {
                generated_content: request.generated_content,
                meta_title: request.meta_title,
                meta_description: request.meta_description,
            },
        )
        .await?;
    Ok(Json(MessageResponse::new(
        "Generation updated successfully",
        updated.into(),
    )))
}

/// Mark a completed generation as published
#[utoipa::path(
    post,
    path = "/api/v1/generations/{id}/publish",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Generation UUID")),
    responses(
        (status = 200, description = "Generation published", body = MessageResponse<GenerationResponse>),
        (status = 422, description = "Generation is not completed", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn publish_generation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(generation_id): Path<Uuid>,
) -> Result<Json<MessageResponse<GenerationResponse>>, ApiError> {
    let generation = load_generation(&state, &auth, generation_id).await?;
    let published = ContentGenerationRepository::new(&state.db)
        .publish(generation)
        .await?;
    tracing::info!(%generation_id, "Generation published");
    Ok(Json(MessageResponse::new(
        "Content published successfully",
        published.into(),
    )))
}

/// Re-queue a failed generation
#[utoipa::path(
    post,
    path = "/api/v1/generations/{id}/retry",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Generation UUID")),
    responses(
        (status = 200, description = "Generation re-queued", body = MessageResponse<GenerationResponse>),
        (status = 422, description = "Generation has not failed", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn retry_generation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(generation_id): Path<Uuid>,
) -> Result<Json<MessageResponse<GenerationResponse>>, ApiError> {
    let generation = load_generation(&state, &auth, generation_id).await?;
    let queued = ContentGenerationRepository::new(&state.db)
        .retry(generation)
        .await?;
    tracing::info!(%generation_id, "Generation re-queued");
    Ok(Json(MessageResponse::new(
        "Generation queued for retry",
        queued.into(),
    )))
}

/// Delete a generation
#[utoipa::path(
    delete,
    path = "/api/v1/generations/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Generation UUID")),
    responses(
        (status = 204, description = "Generation deleted"),
        (status = 403, description = "Generation belongs to another tenant", body = ApiError),
        (status = 404, description = "Generation not found", body = ApiError)
    ),
    tag = "generations"
)]
pub async fn delete_generation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(generation_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let generation = load_generation(&state, &auth, generation_id).await?;
    ContentGenerationRepository::new(&state.db)
        .delete(generation.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
