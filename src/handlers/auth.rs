//! # Authentication Handlers
//!
//! Self-service registration, password login for tenant users and super
//! admins, and the current-principal endpoints.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{AuthUser, hash_password, verify_password};
use crate::error::{ApiError, forbidden, unauthorized};
use crate::handlers::tenants::{TenantResponse, TenantSummary};
use crate::handlers::users::UserResponse;
use crate::models::user::{self, ROLE_TENANT_ADMIN};
use crate::repositories::tenant::NewTenant;
use crate::repositories::user::NewUser;
use crate::repositories::{TenantRepository, UserRepository};
use crate::server::AppState;
use crate::validation::FieldErrors;

const REGISTRATION_PLAN: &str = "starter";
const REGISTRATION_TOKEN_LIMIT: i64 = 10_000;
const TENANT_DOMAIN_SUFFIX: &str = "ainstein.local";

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@acme.test")]
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    #[schema(example = "Acme Corp")]
    pub company_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub token: String,
    pub user: UserResponse,
    pub tenant: TenantResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@acme.test")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
    pub tenant: Option<TenantSummary>,
}

/// Lowercase ASCII slug: runs of anything else collapse into one `-`.
pub fn slugify(value: &str) -> String {
    let ascii = deunicode::deunicode(value);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("tenant");
    }
    slug
}

/// First free subdomain among `slug`, `slug-2`, `slug-3`, ...
async fn unique_subdomain(tenants: &TenantRepository<'_>, slug: &str) -> Result<String, ApiError> {
    let mut candidate = slug.to_string();
    let mut suffix = 2;
    while tenants.find_by_subdomain(&candidate).await?.is_some() {
        candidate = format!("{slug}-{suffix}");
        suffix += 1;
    }
    Ok(candidate)
}

/// Register a new tenant together with its first administrator
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Tenant and user created", body = RegisterResponse),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let users = UserRepository::new(&state.db);
    let tenants = TenantRepository::new(&state.db);

    let mut errors = FieldErrors::new();
    errors.text("name", &request.name, 255);
    errors.email("email", &request.email);
    errors.text("company_name", &request.company_name, 255);
    if request.password.chars().count() < 8 {
        errors.add("password", "The password field must be at least 8 characters.");
    } else if request.password != request.password_confirmation {
        errors.add("password", "The password field confirmation does not match.");
    }
    if users.email_exists(&request.email).await? {
        errors.add("email", "The email has already been taken.");
    }
    errors.finish()?;

    let company = request.company_name.trim().to_string();
    let subdomain = unique_subdomain(&tenants, &slugify(&company)).await?;
    let tenant = tenants
        .create(NewTenant {
            name: company,
            domain: Some(format!("{subdomain}.{TENANT_DOMAIN_SUFFIX}")),
            subdomain: Some(subdomain),
            plan_type: REGISTRATION_PLAN.to_string(),
            tokens_monthly_limit: REGISTRATION_TOKEN_LIMIT,
            status: None,
            theme_config: None,
            brand_config: None,
            features: None,
        })
        .await?;

    let user = users
        .create(NewUser {
            tenant_id: Some(tenant.id),
            email: request.email,
            password_hash: hash_password(&request.password)?,
            name: request.name.trim().to_string(),
            role: Some(ROLE_TENANT_ADMIN.to_string()),
            is_super_admin: false,
            is_active: true,
            email_verified: true,
            preferences: None,
        })
        .await?;
    tracing::info!(user_id = %user.id, tenant_id = %tenant.id, "New tenant registered");

    state.notifier.send_welcome(&user, Some(&tenant)).await;
    state
        .notifier
        .notify_new_user(&user, Some(&tenant.name))
        .await;

    let issued = state.jwt.issue(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            token: issued.token,
            user: user.into(),
            tenant: tenant.into(),
        }),
    ))
}

/// Shared password check for both login endpoints.
async fn password_login(
    state: &AppState,
    request: LoginRequest,
    super_admin_only: bool,
) -> Result<LoginResponse, ApiError> {
    let users = UserRepository::new(&state.db);
    let invalid = || unauthorized(Some("Invalid credentials"));

    let user = users
        .find_by_email(&request.email)
        .await?
        .filter(|u| !super_admin_only || u.is_super_admin)
        .ok_or_else(invalid)?;

    if user.password_hash.is_empty() {
        tracing::error!(user_id = %user.id, "User has no password hash configured");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "User configuration error",
        ));
    }
    if !verify_password(&request.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Rejected login with wrong password");
        return Err(invalid());
    }
    if !user.is_active {
        return Err(forbidden(Some("Account is inactive")));
    }

    let user: user::Model = users.touch_last_login(user).await?;
    let issued = state.jwt.issue(&user)?;
    tracing::info!(user_id = %user.id, super_admin = user.is_super_admin, "User logged in");

    Ok(LoginResponse {
        token: issued.token,
        token_type: "Bearer".to_string(),
        expires_in: issued.expires_in,
        user: user.into(),
    })
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 403, description = "Account is inactive", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    password_login(&state, request, false).await.map(Json)
}

/// Log in as a super admin
#[utoipa::path(
    post,
    path = "/api/v1/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    password_login(&state, request, true).await.map(Json)
}

/// Current user and tenant
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current principal", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<MeResponse>, ApiError> {
    let tenant = match auth.user.tenant_id {
        Some(id) => TenantRepository::new(&state.db).find_by_id(id).await?,
        None => None,
    };
    Ok(Json(MeResponse {
        tenant: tenant.as_ref().map(TenantSummary::from),
        user: auth.user.into(),
    }))
}

/// Log out (tokens are stateless; the client discards its token)
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    security(("bearer_auth" = [])),
    responses((status = 204, description = "Logged out")),
    tag = "auth"
)]
pub async fn logout(auth: AuthUser) -> StatusCode {
    tracing::debug!(user_id = %auth.id(), "User logged out");
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
        assert_eq!(slugify("  Foo & Bar, Inc. "), "foo-bar-inc");
        assert_eq!(slugify("Ünïcode"), "unicode");
        assert_eq!(slugify("Café Société"), "cafe-societe");
        assert_eq!(slugify("!!!"), "tenant");
    }
}
