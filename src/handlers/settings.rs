//! Public platform settings.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::server::AppState;

/// Settings safe to expose without authentication
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicSettings {
    #[schema(example = "Ainstein Platform")]
    pub platform_name: String,
    pub platform_description: Option<String>,
    pub maintenance_mode: bool,
    pub logo_path: Option<String>,
    pub favicon_path: Option<String>,
    pub features: Vec<String>,
    pub google_login: bool,
    pub facebook_login: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/settings/public",
    responses((status = 200, description = "Public settings", body = PublicSettings)),
    tag = "settings"
)]
pub async fn public_settings(State(state): State<AppState>) -> Result<Json<PublicSettings>, ApiError> {
    let settings = state.settings.get_all().await?;
    Ok(Json(PublicSettings {
        platform_name: settings.platform_name.clone(),
        platform_description: settings.platform_description.clone(),
        maintenance_mode: settings.maintenance_mode,
        logo_path: settings.logo_path.clone(),
        favicon_path: settings.favicon_path.clone(),
        features: settings.enabled_features(),
        google_login: settings.is_google_login_configured(),
        facebook_login: settings.is_facebook_login_configured(),
    }))
}
