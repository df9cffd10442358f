//! User entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

pub const ROLE_MEMBER: &str = "member";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_TENANT_ADMIN: &str = "tenant_admin";
pub const ROLES: &[&str] = &[ROLE_MEMBER, ROLE_ADMIN, ROLE_TENANT_ADMIN];

/// Platform user; `tenant_id` is empty only for platform operators.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning tenant (nullable for super admins)
    pub tenant_id: Option<Uuid>,

    /// Login email (unique)
    pub email: String,

    /// bcrypt hash of the password
    pub password_hash: String,

    pub name: String,

    pub avatar: Option<String>,

    /// Role within the tenant (member|admin|tenant_admin)
    pub role: String,

    pub is_super_admin: bool,

    pub is_active: bool,

    pub email_verified: bool,

    #[sea_orm(column_type = "JsonBinary")]
    pub preferences: Option<JsonValue>,

    pub last_login: Option<DateTimeWithTimeZone>,

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
    /// Tenant admin: `admin` or `tenant_admin` within its own tenant.
    pub fn is_tenant_admin(&self) -> bool {
        self.role == ROLE_ADMIN || self.role == ROLE_TENANT_ADMIN
    }

    /// Whether the user may act on rows owned by `tenant_id`.
    pub fn can_access_tenant(&self, tenant_id: Uuid) -> bool {
        self.is_super_admin || self.tenant_id == Some(tenant_id)
    }
}
