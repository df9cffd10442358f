//! # User Administration Handlers
//!
//! Super-admin CRUD over every user of the platform.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthUser, hash_password};
use crate::error::{ApiError, unprocessable};
use crate::handlers::types::{DataResponse, MessageResponse, PaginatedResponse, non_empty};
use crate::models::user::{self, ROLES};
use crate::repositories::user::{NewUser, UserChanges, UserFilter};
use crate::repositories::{Pagination, TenantRepository, UserRepository};
use crate::server::AppState;
use crate::validation::FieldErrors;

/// User as returned by the API (never includes the password hash)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = Option<String>)]
    pub tenant_id: Option<Uuid>,
    #[schema(example = "ada@acme.test")]
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    #[schema(example = "tenant_admin")]
    pub role: String,
    pub is_super_admin: bool,
    pub is_active: bool,
    pub email_verified: bool,
    pub preferences: Option<serde_json::Value>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            email: model.email,
            name: model.name,
            avatar: model.avatar,
            role: model.role,
            is_super_admin: model.is_super_admin,
            is_active: model.is_active,
            email_verified: model.email_verified,
            preferences: model.preferences,
            last_login: model.last_login.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    pub tenant_id: Option<Uuid>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    /// Substring of email or name
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    #[schema(value_type = Option<String>)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub is_super_admin: bool,
    pub is_active: Option<bool>,
    /// Send the welcome mail (default true)
    pub send_welcome: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub is_super_admin: Option<bool>,
    /// `null` detaches the user from its tenant
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub tenant_id: Option<Option<Uuid>>,
    pub password: Option<String>,
}

/// Users may only be attached to an existing, active tenant.
async fn check_tenant(state: &AppState, errors: &mut FieldErrors, tenant_id: Option<Uuid>) -> Result<(), ApiError> {
    let Some(tenant_id) = tenant_id else {
        return Ok(());
    };
    match TenantRepository::new(&state.db).find_by_id(tenant_id).await? {
        None => errors.add("tenant_id", "The selected tenant id is invalid."),
        Some(tenant) if !tenant.is_active() => {
            errors.add("tenant_id", "The selected tenant is not active.")
        }
        Some(_) => {}
    }
    Ok(())
}

/// List users across tenants
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    security(("bearer_auth" = [])),
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated users", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Super admin access required", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>, ApiError> {
    let filter = UserFilter {
        tenant_id: query.tenant_id,
        role: non_empty(query.role),
        is_active: query.is_active,
        search: non_empty(query.search),
    };
    let paged = UserRepository::new(&state.db)
        .list(filter, Pagination::new(query.page, query.per_page))
        .await?;
    Ok(Json(PaginatedResponse::from_paged(paged, UserResponse::from)))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    security(("bearer_auth" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = MessageResponse<UserResponse>),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<MessageResponse<UserResponse>>), ApiError> {
    let users = UserRepository::new(&state.db);

    let mut errors = FieldErrors::new();
    errors.text("name", &request.name, 255);
    errors.email("email", &request.email);
    if request.password.chars().count() < 8 {
        errors.add("password", "The password field must be at least 8 characters.");
    }
    errors.one_of("role", request.role.as_deref(), ROLES);
    check_tenant(&state, &mut errors, request.tenant_id).await?;
    if users.email_exists(&request.email).await? {
        errors.add("email", "The email has already been taken.");
    }
    errors.finish()?;

    let user = users
        .create(NewUser {
            tenant_id: request.tenant_id,
            email: request.email,
            password_hash: hash_password(&request.password)?,
            name: request.name.trim().to_string(),
            role: request.role,
            is_super_admin: request.is_super_admin,
            is_active: request.is_active.unwrap_or(true),
            email_verified: true,
            preferences: None,
        })
        .await?;
    tracing::info!(user_id = %user.id, "User created by super admin");

    if request.send_welcome.unwrap_or(true) {
        let tenant = match user.tenant_id {
            Some(id) => TenantRepository::new(&state.db).find_by_id(id).await?,
            None => None,
        };
        state.notifier.send_welcome(&user, tenant.as_ref()).await;
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully", user.into())),
    ))
}

/// Get a user
#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User UUID")),
    responses(
        (status = 200, description = "User", body = DataResponse<UserResponse>),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DataResponse<UserResponse>>, ApiError> {
    let user = UserRepository::new(&state.db).get(user_id).await?;
    Ok(Json(DataResponse { data: user.into() }))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User UUID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = MessageResponse<UserResponse>),
        (status = 404, description = "User not found", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<MessageResponse<UserResponse>>, ApiError> {
    let users = UserRepository::new(&state.db);
    users.get(user_id).await?;

    let mut errors = FieldErrors::new();
    if let Some(name) = request.name.as_deref() {
        errors.text("name", name, 255);
    }
    errors.one_of("role", request.role.as_deref(), ROLES);
    if let Some(password) = request.password.as_deref()
        && password.chars().count() < 8
    {
        errors.add("password", "The password field must be at least 8 characters.");
    }
    check_tenant(&state, &mut errors, request.tenant_id.flatten()).await?;
    errors.finish()?;

    let password_hash = match request.password.as_deref() {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };
    let user = users
        .update(
            user_id,
            UserChanges {
                name: request.name.map(|n| n.trim().to_string()),
                role: request.role,
                is_active: request.is_active,
                is_super_admin: request.is_super_admin,
                tenant_id: request.tenant_id,
                password_hash,
                avatar: None,
            },
        )
        .await?;

    Ok(Json(MessageResponse::new(
        "User updated successfully",
        user.into(),
    )))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User UUID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = ApiError),
        (status = 422, description = "Cannot delete yourself", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if auth.id() == user_id {
        return Err(unprocessable("You cannot delete your own account."));
    }
    UserRepository::new(&state.db).delete(user_id).await?;
    tracing::info!(%user_id, deleted_by = %auth.id(), "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
