//! # API Key Handlers
//!
//! Tenant API keys. The plaintext key is returned exactly once on creation;
//! only its SHA-256 digest is stored.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthUser, TenantContext, generate_api_key, hash_api_key};
use crate::error::{ApiError, not_found, unprocessable};
use crate::handlers::types::{DataResponse, MessageResponse};
use crate::models::api_key;
use crate::repositories::ApiKeyRepository;
use crate::repositories::api_key::NewApiKey;
use crate::server::AppState;
use crate::validation::FieldErrors;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyResponse {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(example = "CMS sync")]
    pub name: String,
    pub permissions: Vec<String>,
    /// revoked, expired, expiring_soon or active
    #[schema(example = "active")]
    pub status: String,
    pub is_active: bool,
    pub last_used: Option<String>,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
}

impl ApiKeyResponse {
    fn at(model: api_key::Model, now: DateTime<Utc>) -> Self {
        Self {
            status: model.status_at(now).to_string(),
            permissions: model.permission_list(),
            id: model.id,
            name: model.name,
            is_active: model.is_active,
            last_used: model.last_used.map(|dt| dt.to_rfc3339()),
            expires_at: model.expires_at.map(|dt| dt.to_rfc3339()),
            revoked_at: model.revoked_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Newly created key including its one-time plaintext
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub key: ApiKeyResponse,
    /// Shown only once
    #[schema(example = "ak_3fJk9...")]
    pub plain_key: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// List the tenant's API keys
#[utoipa::path(
    get,
    path = "/api/v1/api-keys",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "API keys, newest first", body = DataResponse<Vec<ApiKeyResponse>>)
    ),
    tag = "api-keys"
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> Result<Json<DataResponse<Vec<ApiKeyResponse>>>, ApiError> {
    let now = Utc::now();
    let keys = ApiKeyRepository::new(&state.db)
        .list_for_tenant(ctx.id())
        .await?;
    Ok(Json(DataResponse {
        data: keys.into_iter().map(|k| ApiKeyResponse::at(k, now)).collect(),
    }))
}

/// Create an API key
#[utoipa::path(
    post,
    path = "/api/v1/api-keys",
    security(("bearer_auth" = [])),
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "API key created", body = MessageResponse<CreatedApiKey>),
        (status = 422, description = "Validation failed or plan limit reached", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    auth: AuthUser,
    ctx: TenantContext,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<MessageResponse<CreatedApiKey>>), ApiError> {
    let now = Utc::now();

    let mut errors = FieldErrors::new();
    errors.text("name", &request.name, 255);
    if let Some(expires_at) = request.expires_at
        && expires_at <= now
    {
        errors.add("expires_at", "The expires at field must be a date after now.");
    }
    errors.finish()?;

    let keys = ApiKeyRepository::new(&state.db);
    let limit = ctx.tenant.api_key_limit();
    if keys.count_usable(ctx.id(), now).await? >= limit {
        return Err(unprocessable(&format!(
            "API key limit reached for the {} plan ({limit} active keys).",
            ctx.tenant.plan_type
        )));
    }

    let plain_key = generate_api_key();
    let key = keys
        .create(NewApiKey {
            tenant_id: ctx.id(),
            name: request.name.trim().to_string(),
            key_hash: hash_api_key(&plain_key),
            permissions: request.permissions,
            expires_at: request.expires_at,
            created_by: Some(auth.id()),
        })
        .await?;
    tracing::info!(api_key_id = %key.id, tenant_id = %ctx.id(), "API key created");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "API key created successfully. Store it now; it will not be shown again.",
            CreatedApiKey {
                key: ApiKeyResponse::at(key, now),
                plain_key,
            },
        )),
    ))
}

/// Revoke an API key
#[utoipa::path(
    delete,
    path = "/api/v1/api-keys/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "API key UUID")),
    responses(
        (status = 200, description = "API key revoked", body = MessageResponse<ApiKeyResponse>),
        (status = 404, description = "API key not found", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn revoke_api_key(
    State(state): State<AppState>,
    auth: AuthUser,
    ctx: TenantContext,
    Path(key_id): Path<Uuid>,
) -> Result<Json<MessageResponse<ApiKeyResponse>>, ApiError> {
    let keys = ApiKeyRepository::new(&state.db);
    let key = keys
        .find_in_tenant(ctx.id(), key_id)
        .await?
        .ok_or_else(|| not_found("API key not found"))?;
    let revoked = keys.revoke(key, auth.id()).await?;
    tracing::info!(api_key_id = %key_id, revoked_by = %auth.id(), "API key revoked");

    Ok(Json(MessageResponse::new(
        "API key revoked successfully",
        ApiKeyResponse::at(revoked, Utc::now()),
    )))
}
