//! # API Key Repository
//!
//! Keys are looked up by the SHA-256 digest of the presented token.

use crate::error::RepositoryError;
use crate::models::api_key::{
    ActiveModel as ApiKeyActiveModel, Column, Entity as ApiKey, Model as ApiKeyModel,
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub tenant_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub permissions: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiKeyStats {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
}

pub struct ApiKeyRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewApiKey) -> Result<ApiKeyModel, RepositoryError> {
        let now = Utc::now();
        ApiKeyActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            name: Set(request.name),
            key_hash: Set(request.key_hash),
            permissions: Set(Some(json!(request.permissions))),
            last_used: Set(None),
            expires_at: Set(request.expires_at.map(Into::into)),
            is_active: Set(true),
            created_by: Set(request.created_by),
            revoked_at: Set(None),
            revoked_by: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyModel>, RepositoryError> {
        ApiKey::find()
            .filter(Column::KeyHash.eq(key_hash))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_in_tenant(
        &self,
        tenant_id: Uuid,
        key_id: Uuid,
    ) -> Result<Option<ApiKeyModel>, RepositoryError> {
        ApiKey::find_by_id(key_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<ApiKeyModel>, RepositoryError> {
        ApiKey::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by_desc(Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Keys that are active and unexpired at `now`.
    pub async fn count_usable(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        ApiKey::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(Column::ExpiresAt.is_null())
                    .add(Column::ExpiresAt.gt(now)),
            )
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn touch_last_used(&self, key_id: Uuid) -> Result<(), RepositoryError> {
        ApiKey::update_many()
            .col_expr(Column::LastUsed, Expr::value(Utc::now()))
            .filter(Column::Id.eq(key_id))
            .exec(self.db)
            .await?;
        Ok(())
    }

    pub async fn revoke(
        &self,
        key: ApiKeyModel,
        revoked_by: Uuid,
    ) -> Result<ApiKeyModel, RepositoryError> {
        let now = Utc::now();
        let mut active = key.into_active_model();
        active.is_active = Set(false);
        active.revoked_at = Set(Some(now.into()));
        active.revoked_by = Set(Some(revoked_by));
        active.updated_at = Set(now.into());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn stats(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ApiKeyStats, RepositoryError> {
        let keys = self.list_for_tenant(tenant_id).await?;
        Ok(ApiKeyStats {
            total: keys.len() as u64,
            active: keys.iter().filter(|k| k.is_usable_at(now)).count() as u64,
            expired: keys.iter().filter(|k| k.is_expired_at(now)).count() as u64,
        })
    }
}
