//! # Platform Administration Handlers
//!
//! Super-admin statistics, platform settings and AI provider checks.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::handlers::tenants::TenantResponse;
use crate::handlers::types::MessageResponse;
use crate::handlers::usage::CountsByStatus;
use crate::models::tenant::STATUSES;
use crate::repositories::{ContentGenerationRepository, TenantRepository, UserRepository};
use crate::server::AppState;
use crate::settings::SettingsUpdate;

const RECENT_TENANTS: u64 = 5;
const DEFAULT_TEST_PROMPT: &str = "Write one short sentence confirming the connection works.";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserTotals {
    pub total: u64,
    pub active: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlatformStats {
    pub tenants: CountsByStatus,
    pub users: UserTotals,
    pub generations: CountsByStatus,
    /// Tokens consumed in the current period across all tenants
    pub tokens_used_this_period: i64,
    pub recent_tenants: Vec<TenantResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub default_model: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AiTestRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AiTestResponse {
    pub success: bool,
    pub model: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AiValidateRequest {
    /// Key to check; the configured key when omitted
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AiValidateResponse {
    pub valid: bool,
}

/// Platform-wide statistics
#[utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Platform statistics", body = PlatformStats),
        (status = 403, description = "Super admin access required", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn platform_stats(State(state): State<AppState>) -> Result<Json<PlatformStats>, ApiError> {
    let tenants = TenantRepository::new(&state.db);
    let users = UserRepository::new(&state.db);

    let mut tenant_counts = Vec::with_capacity(STATUSES.len());
    for status in STATUSES {
        let count = tenants.count_by_status(Some(status)).await?;
        tenant_counts.push((status.to_string(), count as i64));
    }

    let generations = ContentGenerationRepository::new(&state.db)
        .count_by_status(None)
        .await?;

    Ok(Json(PlatformStats {
        tenants: CountsByStatus::from_pairs(tenant_counts),
        users: UserTotals {
            total: users.count_all().await?,
            active: users.count_active(None).await?,
        },
        generations: CountsByStatus::from_pairs(generations),
        tokens_used_this_period: tenants.total_tokens_used().await?,
        recent_tenants: tenants
            .recent(RECENT_TENANTS)
            .await?
            .into_iter()
            .map(TenantResponse::from)
            .collect(),
    }))
}

/// Platform settings with secrets masked
#[utoipa::path(
    get,
    path = "/api/v1/admin/settings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Settings; secrets masked", body = Object)
    ),
    tag = "admin"
)]
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let snapshot = state.settings.get_all().await?;
    Ok(Json(snapshot.masked_json()))
}

/// Update platform settings
#[utoipa::path(
    put,
    path = "/api/v1/admin/settings",
    security(("bearer_auth" = [])),
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Settings updated", body = MessageResponse<Object>),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<MessageResponse<Value>>, ApiError> {
    let snapshot = state.settings.update(update).await?;
    tracing::info!("Platform settings updated");
    Ok(Json(MessageResponse::new(
        "Settings updated successfully",
        snapshot.masked_json(),
    )))
}

/// Models offered by the AI provider
#[utoipa::path(
    get,
    path = "/api/v1/admin/ai/models",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Available models", body = ModelsResponse)),
    tag = "admin"
)]
pub async fn ai_models(State(state): State<AppState>) -> Result<Json<ModelsResponse>, ApiError> {
    Ok(Json(ModelsResponse {
        models: state.ai.available_models().await,
        default_model: state.ai.default_model().await?,
    }))
}

/// Run one completion against the configured provider
#[utoipa::path(
    post,
    path = "/api/v1/admin/ai/test",
    security(("bearer_auth" = [])),
    request_body = AiTestRequest,
    responses(
        (status = 200, description = "Provider answered", body = AiTestResponse),
        (status = 502, description = "Provider call failed", body = ApiError),
        (status = 503, description = "Provider not configured", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn ai_test(
    State(state): State<AppState>,
    Json(request): Json<AiTestRequest>,
) -> Result<Json<AiTestResponse>, ApiError> {
    let prompt = request
        .prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TEST_PROMPT.to_string());
    let content = state.ai.generate_simple_content(&prompt).await?;
    Ok(Json(AiTestResponse {
        success: true,
        model: state.ai.default_model().await?,
        content,
    }))
}

/// Check an OpenAI API key by listing models with it
#[utoipa::path(
    post,
    path = "/api/v1/admin/ai/validate",
    security(("bearer_auth" = [])),
    request_body = AiValidateRequest,
    responses((status = 200, description = "Validation result", body = AiValidateResponse)),
    tag = "admin"
)]
pub async fn ai_validate(
    State(state): State<AppState>,
    Json(request): Json<AiValidateRequest>,
) -> Json<AiValidateResponse> {
    let key = request.api_key.filter(|k| !k.trim().is_empty());
    Json(AiValidateResponse {
        valid: state.ai.validate_api_key(key.as_deref()).await,
    })
}
