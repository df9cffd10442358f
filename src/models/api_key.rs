//! ApiKey entity model
//!
//! Tenant-scoped bearer credentials. Only the SHA-256 digest is persisted.

use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Keys expiring within this window report `expiring_soon`.
pub const EXPIRING_SOON_DAYS: i64 = 7;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub name: String,

    /// Hex SHA-256 of the plaintext key
    #[sea_orm(unique)]
    pub key_hash: String,

    /// Granted permission names (JSON array)
    #[sea_orm(column_type = "JsonBinary")]
    pub permissions: Option<JsonValue>,

    pub last_used: Option<DateTimeWithTimeZone>,

    pub expires_at: Option<DateTimeWithTimeZone>,

    pub is_active: bool,

    pub created_by: Option<Uuid>,

    pub revoked_at: Option<DateTimeWithTimeZone>,

    pub revoked_by: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Usable for authentication: active and not expired.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// revoked | expired | expiring_soon | active
    pub fn status_at(&self, now: DateTime<Utc>) -> &'static str {
        if !self.is_active {
            return "revoked";
        }
        match self.expires_at {
            Some(expires) if expires <= now => "expired",
            Some(expires) if expires <= now + Duration::days(EXPIRING_SOON_DAYS) => {
                "expiring_soon"
            }
            _ => "active",
        }
    }

    pub fn permission_list(&self) -> Vec<String> {
        self.permissions
            .as_ref()
            .and_then(JsonValue::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permission_list().iter().any(|p| p == permission)
    }
}
