//! Page entity model
//!
//! Pages are the tenant-scoped targets (URL path + keyword) content is generated for.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

pub const STATUSES: &[&str] = &["draft", "active", "inactive", "pending"];
pub const CMS_TYPES: &[&str] = &["wordpress", "drupal", "joomla", "custom"];

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// Path of the target page (unique per tenant)
    pub url_path: String,

    /// Target SEO keyword
    pub keyword: String,

    pub category: Option<String>,

    /// ISO 639-1 language code
    pub language: String,

    pub cms_type: Option<String>,

    pub cms_page_id: Option<String>,

    /// draft|active|inactive|pending
    pub status: String,

    /// 1..=10
    pub priority: i32,

    /// Free-form metadata; may carry `meta_title`, `meta_description`, `content_brief`
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    pub last_synced: Option<DateTimeWithTimeZone>,

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
    #[sea_orm(has_many = "super::content_generation::Entity")]
    ContentGenerations,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::content_generation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ContentGenerations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn priority_text(&self) -> &'static str {
        priority_text(self.priority)
    }

    /// String value stored under `key` in the page metadata, when non-empty.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get(key))
            .and_then(JsonValue::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

pub fn priority_text(priority: i32) -> &'static str {
    match priority {
        1 => "Low",
        2 => "Normal",
        3 => "High",
        4 => "Critical",
        _ => "Normal",
    }
}

/// Completed share of generations in percent, two decimals; zero without generations.
pub fn success_rate(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 10000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_labels() {
        assert_eq!(priority_text(1), "Low");
        assert_eq!(priority_text(3), "High");
        assert_eq!(priority_text(4), "Critical");
        assert_eq!(priority_text(9), "Normal");
    }

    #[test]
    fn success_rate_two_decimals() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(1, 3), 33.33);
        assert_eq!(success_rate(2, 2), 100.0);
    }
}
