//! Tenant entity model
//!
//! This module contains the SeaORM entity model for the tenants table,
//! the isolation boundary for every other tenant-scoped record.

use chrono::{DateTime, Datelike, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUSES: &[&str] = &["active", "inactive", "suspended"];
pub const PLAN_TYPES: &[&str] = &["free", "starter", "pro", "enterprise"];
/// Plans accepted by the tenant create/update endpoints.
pub const API_PLAN_TYPES: &[&str] = &["free", "pro", "enterprise"];

/// Tenant entity representing an isolated customer organisation
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Custom domain (unique)
    pub domain: Option<String>,

    /// Subdomain slug (unique)
    pub subdomain: Option<String>,

    /// Subscription plan (free|starter|pro|enterprise)
    pub plan_type: String,

    /// Monthly token allowance
    pub tokens_monthly_limit: i64,

    /// Tokens consumed in the current usage period
    pub tokens_used_current: i64,

    /// Month (`YYYY-MM`) the current counter belongs to
    pub usage_period: String,

    /// Lifecycle status (active|inactive|suspended)
    pub status: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub theme_config: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary")]
    pub brand_config: Option<JsonValue>,

    pub features: String,

    pub stripe_customer_id: Option<String>,

    pub stripe_subscription_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
    #[sea_orm(has_many = "super::page::Entity")]
    Pages,
    #[sea_orm(has_many = "super::prompt::Entity")]
    Prompts,
    #[sea_orm(has_many = "super::content_generation::Entity")]
    ContentGenerations,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::page::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pages.def()
    }
}

impl Related<super::prompt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prompts.def()
    }
}

impl Related<super::content_generation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ContentGenerations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    pub fn remaining_tokens(&self) -> i64 {
        (self.tokens_monthly_limit - self.tokens_used_current).max(0)
    }

    /// Share of the monthly limit consumed, rounded to one decimal.
    pub fn usage_percent(&self) -> f64 {
        usage_percent(self.tokens_used_current, self.tokens_monthly_limit)
    }

    /// Maximum number of active API keys the plan allows.
    pub fn api_key_limit(&self) -> u64 {
        match self.plan_type.as_str() {
            "free" => 2,
            "basic" | "starter" => 5,
            "pro" => 10,
            "enterprise" => 25,
            _ => 2,
        }
    }
}

pub fn usage_percent(used: i64, limit: i64) -> f64 {
    if limit <= 0 {
        return 0.0;
    }
    (used as f64 / limit as f64 * 1000.0).round() / 10.0
}

/// Usage period label (`YYYY-MM`) for an instant.
pub fn usage_period_for(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tenant(plan: &str, used: i64, limit: i64) -> Model {
        let now = Utc::now().fixed_offset();
        Model {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            domain: None,
            subdomain: None,
            plan_type: plan.into(),
            tokens_monthly_limit: limit,
            tokens_used_current: used,
            usage_period: usage_period_for(Utc::now()),
            status: STATUS_ACTIVE.into(),
            theme_config: None,
            brand_config: None,
            features: String::new(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn remaining_tokens_never_negative() {
        assert_eq!(tenant("free", 900, 1000).remaining_tokens(), 100);
        assert_eq!(tenant("free", 1200, 1000).remaining_tokens(), 0);
    }

    #[test]
    fn usage_percent_rounds_to_one_decimal() {
        assert_eq!(tenant("pro", 1234, 10000).usage_percent(), 12.3);
        assert_eq!(tenant("pro", 5, 0).usage_percent(), 0.0);
    }

    #[test]
    fn api_key_limits_follow_plan() {
        assert_eq!(tenant("free", 0, 1).api_key_limit(), 2);
        assert_eq!(tenant("starter", 0, 1).api_key_limit(), 5);
        assert_eq!(tenant("basic", 0, 1).api_key_limit(), 5);
        assert_eq!(tenant("pro", 0, 1).api_key_limit(), 10);
        assert_eq!(tenant("enterprise", 0, 1).api_key_limit(), 25);
    }

    #[test]
    fn usage_period_is_zero_padded() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(usage_period_for(instant), "2025-03");
    }
}
