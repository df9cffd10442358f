//! # Authentication and Authorization
//!
//! Bearer authentication for the JSON API. A bearer token is either a signed
//! session JWT or a tenant API key (`ak_` prefix) that acts as the user who
//! created it. Tenant routes additionally pass through
//! [`tenant_access_middleware`], which resolves the caller's tenant.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, forbidden, not_found, service_unavailable, unauthorized};
use crate::models::{tenant, user};
use crate::repositories::{ApiKeyRepository, TenantRepository, UserRepository};
use crate::server::AppState;

pub const BCRYPT_COST: u32 = 10;
pub const API_KEY_PREFIX: &str = "ak_";
const API_KEY_RANDOM_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("JWT secret is not configured")]
    MissingSecret,
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        tracing::error!(error = %error, "Authentication backend failure");
        crate::error::internal_error()
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

/// An empty or malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    if hash.is_empty() {
        return Ok(false);
    }
    Ok(bcrypt::verify(password, hash)?)
}

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub tid: Option<Uuid>,
    pub sa: bool,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
}

/// HS256 signing material for session tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: u64,
}

impl JwtKeys {
    pub fn new(secret: &[u8], ttl_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AuthError> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSecret)?;
        Ok(Self::new(secret.as_bytes(), config.jwt_ttl_seconds))
    }

    pub fn issue(&self, user: &user::Model) -> Result<IssuedToken, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id,
            tid: user.tenant_id,
            sa: user.is_super_admin,
            role: user.role.clone(),
            iat: now,
            exp: now + self.ttl_seconds as i64,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken {
            token,
            expires_in: self.ttl_seconds,
        })
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// Fresh plaintext API key: `ak_` followed by 32 alphanumerics.
pub fn generate_api_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{API_KEY_PREFIX}{random}")
}

/// Lowercase hex SHA-256 of a plaintext API key.
pub fn hash_api_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Authenticated principal
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: user::Model,
    /// Set when the request authenticated with an API key.
    pub api_key_id: Option<Uuid>,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn is_super_admin(&self) -> bool {
        self.user.is_super_admin
    }

    /// 403 unless the caller belongs to `tenant_id` or is a super admin.
    pub fn ensure_tenant(&self, tenant_id: Uuid) -> Result<(), ApiError> {
        if self.user.can_access_tenant(tenant_id) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user.id,
                resource_tenant_id = %tenant_id,
                "Cross-tenant resource access denied"
            );
            Err(forbidden(Some(
                "Access denied: Resource does not belong to your tenant",
            )))
        }
    }

    pub fn ensure_super_admin(&self) -> Result<(), ApiError> {
        if self.is_super_admin() {
            Ok(())
        } else {
            Err(forbidden(Some("Super admin access required")))
        }
    }
}

/// Tenant resolved for the current request
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: tenant::Model,
}

impl TenantContext {
    pub fn id(&self) -> Uuid {
        self.tenant.id
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

async fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, ApiError> {
    let users = UserRepository::new(&state.db);

    if token.starts_with(API_KEY_PREFIX) {
        let keys = ApiKeyRepository::new(&state.db);
        let key = keys
            .find_by_hash(&hash_api_key(token))
            .await?
            .filter(|key| key.is_usable_at(Utc::now()))
            .ok_or_else(|| unauthorized(Some("Invalid API key")))?;

        let creator = match key.created_by {
            Some(id) => users.find_by_id(id).await?,
            None => None,
        };
        let user = creator
            .filter(|u| u.is_active && u.tenant_id == Some(key.tenant_id))
            .ok_or_else(|| unauthorized(Some("API key owner is no longer active")))?;

        if let Err(err) = keys.touch_last_used(key.id).await {
            tracing::warn!(api_key_id = %key.id, error = %err, "Failed to record API key usage");
        }

        return Ok(AuthUser {
            user,
            api_key_id: Some(key.id),
        });
    }

    let claims = state.jwt.decode(token).map_err(|err| {
        tracing::debug!(error = %err, "Rejected bearer token");
        unauthorized(Some("Invalid or expired token"))
    })?;

    let user = users
        .find_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| unauthorized(Some("Invalid or expired token")))?;

    Ok(AuthUser {
        user,
        api_key_id: None,
    })
}

/// Resolves the bearer token into an [`AuthUser`] request extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?.to_string();
    let auth = authenticate(&state, &token).await?;
    tracing::debug!(user_id = %auth.id(), api_key = auth.api_key_id.is_some(), "Authenticated request");

    request.extensions_mut().insert(auth);
    Ok(next.run(request).await)
}

/// Requires an active user attached to an active tenant, and honours
/// maintenance mode for everyone except super admins.
pub async fn tenant_access_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| unauthorized(Some("Authentication required")))?;

    if !auth.is_super_admin() {
        let settings = state.settings.get_all().await?;
        if settings.maintenance_mode {
            return Err(service_unavailable(
                "The platform is undergoing maintenance. Please try again later.",
            ));
        }
    }

    let Some(tenant_id) = auth.user.tenant_id else {
        tracing::warn!(user_id = %auth.id(), "User without tenant tried to access tenant resource");
        return Err(forbidden(Some(
            "No tenant access: your account is not associated with any tenant",
        )));
    };

    let tenant = TenantRepository::new(&state.db)
        .find_by_id(tenant_id)
        .await?
        .ok_or_else(|| {
            tracing::error!(user_id = %auth.id(), %tenant_id, "User has tenant_id but tenant not found");
            not_found("Tenant not found")
        })?;

    if !tenant.is_active() {
        tracing::warn!(user_id = %auth.id(), %tenant_id, status = %tenant.status, "Inactive tenant access attempt");
        return Err(forbidden(Some("Tenant inactive"))
            .with_details(json!({ "tenant_status": tenant.status })));
    }

    if !auth.user.is_active {
        return Err(forbidden(Some("User account inactive")));
    }

    request.extensions_mut().insert(TenantContext { tenant });
    Ok(next.run(request).await)
}

pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<AuthUser>() {
        Some(auth) if auth.is_super_admin() => Ok(next.run(request).await),
        Some(_) => Err(forbidden(Some("Super admin access required"))),
        None => Err(unauthorized(Some("Authentication required"))),
    }
}

impl<S: Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

impl<S: Sync> FromRequestParts<S> for TenantContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| forbidden(Some("No tenant access")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::api_key::NewApiKey;
    use crate::repositories::tenant::{NewTenant, TenantChanges};
    use crate::repositories::user::NewUser;
    use crate::server::test_state;
    use crate::settings::SettingsUpdate;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware::{from_fn, from_fn_with_state},
        routing::get,
    };
    use tower::ServiceExt;

    async fn seed_user(state: &AppState, super_admin: bool) -> (tenant::Model, user::Model) {
        let tenant = TenantRepository::new(&state.db)
            .create(NewTenant {
                name: "Acme".into(),
                domain: None,
                subdomain: None,
                plan_type: "pro".into(),
                tokens_monthly_limit: 1000,
                status: None,
                theme_config: None,
                brand_config: None,
                features: None,
            })
            .await
            .unwrap();
        let user = UserRepository::new(&state.db)
            .create(NewUser {
                tenant_id: Some(tenant.id),
                email: format!("{}@acme.test", Uuid::new_v4()),
                password_hash: hash_password("password123").unwrap(),
                name: "Ada".into(),
                role: Some(user::ROLE_TENANT_ADMIN.into()),
                is_super_admin: super_admin,
                is_active: true,
                email_verified: true,
                preferences: None,
            })
            .await
            .unwrap();
        (tenant, user)
    }

    fn router(state: AppState) -> Router {
        async fn whoami(auth: AuthUser, tenant: TenantContext) -> String {
            format!("{}:{}", auth.id(), tenant.id())
        }
        async fn ok() -> &'static str {
            "OK"
        }

        let tenant_routes = Router::new()
            .route("/tenant", get(whoami))
            .route_layer(from_fn_with_state(state.clone(), tenant_access_middleware));
        let admin_routes = Router::new()
            .route("/admin", get(ok))
            .route_layer(from_fn(require_super_admin));

        Router::new()
            .merge(tenant_routes)
            .merge(admin_routes)
            .layer(from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    async fn call(state: &AppState, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        router(state.clone())
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
        assert!(!verify_password("anything", "").unwrap());
    }

    #[test]
    fn api_keys_have_prefix_and_stable_digest() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + API_KEY_RANDOM_LEN);
        assert!(key[3..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(hash_api_key(&key), hash_api_key(&key));
        assert_eq!(hash_api_key(&key).len(), 64);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new(b"a-test-secret-that-is-long-enough", 60);
        let claims = Claims {
            sub: Uuid::new_v4(),
            tid: None,
            sa: false,
            role: "member".into(),
            iat: 0,
            exp: Utc::now().timestamp() - 10,
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(keys.decode(&token).is_err());

        let other = JwtKeys::new(b"a-different-secret-entirely-here", 60);
        let fresh = Claims {
            exp: Utc::now().timestamp() + 60,
            ..claims
        };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &fresh, &other.encoding).unwrap();
        assert!(keys.decode(&token).is_err());
        assert_eq!(other.decode(&token).unwrap(), fresh);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_returns_401() {
        let (state, _) = test_state().await;
        assert_eq!(call(&state, "/tenant", None).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            call(&state, "/tenant", Some("not-a-jwt")).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/tenant")
                    .header(AUTHORIZATION, "Basic dGVzdDoxMjM=")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn jwt_resolves_user_and_tenant() {
        let (state, _) = test_state().await;
        let (_, user) = seed_user(&state, false).await;
        let token = state.jwt.issue(&user).unwrap().token;

        assert_eq!(call(&state, "/tenant", Some(&token)).await.status(), StatusCode::OK);
        assert_eq!(call(&state, "/admin", Some(&token)).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn inactive_tenant_is_forbidden() {
        let (state, _) = test_state().await;
        let (tenant, user) = seed_user(&state, false).await;
        TenantRepository::new(&state.db)
            .update(
                tenant.id,
                TenantChanges {
                    status: Some("suspended".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let token = state.jwt.issue(&user).unwrap().token;

        assert_eq!(call(&state, "/tenant", Some(&token)).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn user_without_tenant_is_forbidden_on_tenant_routes() {
        let (state, _) = test_state().await;
        let admin = UserRepository::new(&state.db)
            .create(NewUser {
                tenant_id: None,
                email: "root@platform.test".into(),
                password_hash: hash_password("password123").unwrap(),
                name: "Root".into(),
                role: Some(user::ROLE_ADMIN.into()),
                is_super_admin: true,
                is_active: true,
                email_verified: true,
                preferences: None,
            })
            .await
            .unwrap();
        let token = state.jwt.issue(&admin).unwrap().token;

        assert_eq!(call(&state, "/tenant", Some(&token)).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(call(&state, "/admin", Some(&token)).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_key_acts_as_creator_until_revoked() {
        let (state, _) = test_state().await;
        let (tenant, user) = seed_user(&state, false).await;
        let plaintext = generate_api_key();
        let keys = ApiKeyRepository::new(&state.db);
        let key = keys
            .create(NewApiKey {
                tenant_id: tenant.id,
                name: "ci".into(),
                key_hash: hash_api_key(&plaintext),
                permissions: vec![],
                expires_at: None,
                created_by: Some(user.id),
            })
            .await
            .unwrap();

        assert_eq!(call(&state, "/tenant", Some(&plaintext)).await.status(), StatusCode::OK);
        let used = keys.find_by_hash(&key.key_hash).await.unwrap().unwrap();
        assert!(used.last_used.is_some());

        keys.revoke(used, user.id).await.unwrap();
        assert_eq!(
            call(&state, "/tenant", Some(&plaintext)).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn maintenance_mode_blocks_tenant_users_only() {
        let (state, _) = test_state().await;
        let (_, member) = seed_user(&state, false).await;
        let (_, operator) = seed_user(&state, true).await;
        state
            .settings
            .update(SettingsUpdate {
                maintenance_mode: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        let member_token = state.jwt.issue(&member).unwrap().token;
        let operator_token = state.jwt.issue(&operator).unwrap().token;
        assert_eq!(
            call(&state, "/tenant", Some(&member_token)).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            call(&state, "/tenant", Some(&operator_token)).await.status(),
            StatusCode::OK
        );
    }
}
