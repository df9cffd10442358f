//! # Server Configuration
//!
//! Application state, router assembly, OpenAPI document and the serve loop
//! with its background tasks.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::ai::AiService;
use crate::auth::{JwtKeys, auth_middleware, require_super_admin, tenant_access_middleware};
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::generation_executor::GenerationExecutor;
use crate::handlers;
use crate::mail::{Notifier, build_mailer};
use crate::settings::PlatformSettings;
use crate::telemetry::trace_context_middleware;
use crate::usage_reset::UsageResetTask;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub settings: PlatformSettings,
    pub ai: AiService,
    pub notifier: Notifier,
    pub executor: GenerationExecutor,
    pub jwt: JwtKeys,
}

/// Wires the shared services on top of an open database connection.
pub fn build_state(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<AppState> {
    let config = Arc::new(config);
    let key_bytes = config
        .crypto_key
        .clone()
        .context("AINSTEIN_CRYPTO_KEY is required to start the server")?;
    let crypto_key = CryptoKey::new(key_bytes)?;
    let jwt = JwtKeys::from_config(&config)?;

    let settings = PlatformSettings::new(db.clone(), crypto_key);
    let ai = AiService::new(settings.clone(), config.openai.clone())
        .context("building the AI HTTP client")?;
    let mailer = build_mailer(&config.mail)?;
    let notifier = Notifier::new(mailer, db.clone(), settings.clone(), config.clone());
    let executor = GenerationExecutor::new(
        db.clone(),
        ai.clone(),
        notifier.clone(),
        config.worker.clone(),
    );

    Ok(AppState {
        db,
        config,
        settings,
        ai,
        notifier,
        executor,
        jwt,
    })
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/admin/login", post(handlers::auth::admin_login))
        .route("/settings/public", get(handlers::settings::public_settings));

    let authenticated = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/tenants",
            get(handlers::tenants::list_tenants).post(handlers::tenants::create_tenant),
        )
        .route(
            "/tenants/{id}",
            get(handlers::tenants::get_tenant)
                .put(handlers::tenants::update_tenant)
                .delete(handlers::tenants::delete_tenant),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let tenant_scoped = Router::new()
        .route(
            "/pages",
            get(handlers::pages::list_pages).post(handlers::pages::create_page),
        )
        .route(
            "/pages/{id}",
            get(handlers::pages::get_page)
                .put(handlers::pages::update_page)
                .delete(handlers::pages::delete_page),
        )
        .route(
            "/prompts",
            get(handlers::prompts::list_prompts).post(handlers::prompts::create_prompt),
        )
        .route(
            "/prompts/{id}",
            get(handlers::prompts::get_prompt)
                .put(handlers::prompts::update_prompt)
                .delete(handlers::prompts::delete_prompt),
        )
        .route(
            "/generations",
            get(handlers::generations::list_generations)
                .post(handlers::generations::create_generation),
        )
        .route(
            "/generations/{id}",
            get(handlers::generations::get_generation)
                .put(handlers::generations::update_generation)
                .delete(handlers::generations::delete_generation),
        )
        .route(
            "/generations/{id}/publish",
            post(handlers::generations::publish_generation),
        )
        .route(
            "/generations/{id}/retry",
            post(handlers::generations::retry_generation),
        )
        .route(
            "/api-keys",
            get(handlers::api_keys::list_api_keys).post(handlers::api_keys::create_api_key),
        )
        .route(
            "/api-keys/{id}",
            axum::routing::delete(handlers::api_keys::revoke_api_key),
        )
        .route("/usage", get(handlers::usage::get_usage))
        .route("/dashboard", get(handlers::usage::get_dashboard))
        .route_layer(from_fn_with_state(state.clone(), tenant_access_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let admin = Router::new()
        .route("/admin/stats", get(handlers::admin::platform_stats))
        .route(
            "/admin/settings",
            get(handlers::admin::get_settings).put(handlers::admin::update_settings),
        )
        .route(
            "/admin/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/admin/users/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/admin/ai/models", get(handlers::admin::ai_models))
        .route("/admin/ai/test", post(handlers::admin::ai_test))
        .route("/admin/ai/validate", post(handlers::admin::ai_validate))
        .route_layer(from_fn(require_super_admin))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(tenant_scoped)
        .merge(admin);

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(trace_context_middleware))
}

/// Starts the server with the given configuration
///
/// The generation worker and the usage reset task run until the server
/// stops; Ctrl-C drains in-flight requests and then cancels both.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .with_context(|| format!("Invalid server address: {}", config.api_bind_addr))?;
    let profile = config.profile.clone();
    let reset_config = config.usage_reset.clone();

    let state = build_state(config, db.clone())?;
    let shutdown = CancellationToken::new();

    let executor = state.executor.clone();
    let worker_token = shutdown.clone();
    let worker = tokio::spawn(async move { executor.run(worker_token).await });

    let reset_token = shutdown.clone();
    let reset = tokio::spawn(UsageResetTask::new(db, reset_config).run(reset_token));

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, %profile, "Server listening");

    let serve_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        tracing::error!(error = %err, "Failed to listen for Ctrl-C");
                    }
                    tracing::info!("Received Ctrl-C, shutting down");
                }
                _ = serve_token.cancelled() => {}
            }
        })
        .await
        .context("serving HTTP")?;

    shutdown.cancel();
    for (name, handle) in [("generation worker", worker), ("usage reset", reset)] {
        if let Err(err) = handle.await {
            tracing::error!(task = name, error = %err, "Background task panicked");
        }
    }
    tracing::info!("Server stopped");
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some(
                        "JWT from /api/v1/auth/login or a tenant API key (ak_...)",
                    ))
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::readyz,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::admin_login,
        crate::handlers::auth::me,
        crate::handlers::auth::logout,
        crate::handlers::settings::public_settings,
        crate::handlers::tenants::list_tenants,
        crate::handlers::tenants::create_tenant,
        crate::handlers::tenants::get_tenant,
        crate::handlers::tenants::update_tenant,
        crate::handlers::tenants::delete_tenant,
        crate::handlers::pages::list_pages,
        crate::handlers::pages::create_page,
        crate::handlers::pages::get_page,
        crate::handlers::pages::update_page,
        crate::handlers::pages::delete_page,
        crate::handlers::prompts::list_prompts,
        crate::handlers::prompts::create_prompt,
        crate::handlers::prompts::get_prompt,
        crate::handlers::prompts::update_prompt,
        crate::handlers::prompts::delete_prompt,
        crate::handlers::generations::create_generation,
        crate::handlers::generations::list_generations,
        crate::handlers::generations::get_generation,
        crate::handlers::generations::update_generation,
        crate::handlers::generations::publish_generation,
        crate::handlers::generations::retry_generation,
        crate::handlers::generations::delete_generation,
        crate::handlers::api_keys::list_api_keys,
        crate::handlers::api_keys::create_api_key,
        crate::handlers::api_keys::revoke_api_key,
        crate::handlers::usage::get_usage,
        crate::handlers::usage::get_dashboard,
        crate::handlers::admin::platform_stats,
        crate::handlers::admin::get_settings,
        crate::handlers::admin::update_settings,
        crate::handlers::admin::ai_models,
        crate::handlers::admin::ai_test,
        crate::handlers::admin::ai_validate,
        crate::handlers::users::list_users,
        crate::handlers::users::create_user,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::HealthStatus,
            crate::handlers::types::PaginationMeta,
            crate::handlers::types::Message,
            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::RegisterResponse,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::LoginResponse,
            crate::handlers::auth::MeResponse,
            crate::handlers::settings::PublicSettings,
            crate::handlers::tenants::TenantResponse,
            crate::handlers::tenants::TenantSummary,
            crate::handlers::tenants::TenantListItem,
            crate::handlers::tenants::TenantDetail,
            crate::handlers::tenants::CreateTenantRequest,
            crate::handlers::tenants::UpdateTenantRequest,
            crate::handlers::pages::PageResponse,
            crate::handlers::pages::PageDetail,
            crate::handlers::pages::CreatePageRequest,
            crate::handlers::pages::UpdatePageRequest,
            crate::handlers::prompts::PromptResponse,
            crate::handlers::prompts::CreatePromptRequest,
            crate::handlers::prompts::UpdatePromptRequest,
            crate::handlers::generations::GenerationResponse,
            crate::handlers::generations::CreateGenerationRequest,
            crate::handlers::generations::UpdateGenerationRequest,
            crate::handlers::api_keys::ApiKeyResponse,
            crate::handlers::api_keys::CreatedApiKey,
            crate::handlers::api_keys::CreateApiKeyRequest,
            crate::handlers::usage::UsageResponse,
            crate::handlers::usage::DashboardResponse,
            crate::handlers::admin::PlatformStats,
            crate::handlers::admin::ModelsResponse,
            crate::handlers::admin::AiTestRequest,
            crate::handlers::admin::AiTestResponse,
            crate::handlers::admin::AiValidateRequest,
            crate::handlers::admin::AiValidateResponse,
            crate::handlers::users::UserResponse,
            crate::handlers::users::CreateUserRequest,
            crate::handlers::users::UpdateUserRequest,
            crate::settings::SettingsUpdate,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information and probes"),
        (name = "auth", description = "Registration, login and the current user"),
        (name = "tenants", description = "Tenant management"),
        (name = "pages", description = "Pages of a tenant's site"),
        (name = "prompts", description = "Prompt templates"),
        (name = "generations", description = "AI content generations"),
        (name = "api-keys", description = "Tenant API keys"),
        (name = "usage", description = "Token usage and dashboard"),
        (name = "admin", description = "Platform administration"),
        (name = "settings", description = "Public platform settings"),
    ),
    info(
        title = "Ainstein API",
        description = "Multi-tenant AI content generation platform",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

/// State backed by a fresh in-memory database, the mock AI provider and an
/// in-memory mailer.
#[cfg(test)]
pub(crate) async fn test_state() -> (AppState, Arc<crate::mail::MemoryMailer>) {
    use crate::ai::MockProvider;
    use crate::mail::MemoryMailer;

    let db = crate::db::test_connection().await;
    let config = Arc::new(AppConfig {
        crypto_key: Some(vec![7u8; 32]),
        jwt_secret: Some("local-secret".to_string()),
        ..AppConfig::default()
    });
    let settings = PlatformSettings::new(
        db.clone(),
        CryptoKey::new(vec![7u8; 32]).expect("test key"),
    );
    let ai = AiService::new(settings.clone(), config.openai.clone())
        .expect("http client")
        .with_provider(Arc::new(MockProvider));
    let mailer = Arc::new(MemoryMailer::default());
    let notifier = Notifier::new(mailer.clone(), db.clone(), settings.clone(), config.clone());
    let executor = GenerationExecutor::new(
        db.clone(),
        ai.clone(),
        notifier.clone(),
        config.worker.clone(),
    );
    let jwt = JwtKeys::from_config(&config).expect("jwt keys");

    (
        AppState {
            db,
            config,
            settings,
            ai,
            notifier,
            executor,
            jwt,
        },
        mailer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_bearer_scheme_and_tenant_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/api/v1/generations/{id}/retry"));
        assert!(doc.paths.paths.contains_key("/api/v1/admin/settings"));
    }

    #[tokio::test]
    async fn build_state_requires_crypto_key() {
        let db = crate::db::test_connection().await;
        let config = AppConfig {
            jwt_secret: Some("secret".to_string()),
            ..AppConfig::default()
        };
        assert!(build_state(config, db).is_err());
    }
}
