//! Prompt entity model
//!
//! Prompts are reusable templates with `{{variable}}` placeholders. System
//! prompts (`is_system`) are owned by the platform tenant and visible to all.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "prompts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub name: String,

    /// Short handle, unique per tenant when set
    pub alias: Option<String>,

    pub description: Option<String>,

    /// Template body with `{{variable}}` placeholders
    pub template: String,

    /// Declared variable names (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub variables: Option<JsonValue>,

    pub category: Option<String>,

    pub is_active: bool,

    pub is_system: bool,

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
    pub fn variable_names(&self) -> Vec<String> {
        self.variables
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

    /// Generation type this prompt produces, derived from category then name.
    pub fn prompt_type(&self) -> &'static str {
        self.category
            .as_deref()
            .and_then(classify_prompt_type)
            .or_else(|| classify_prompt_type(&self.name))
            .unwrap_or("content")
    }
}

fn classify_prompt_type(label: &str) -> Option<&'static str> {
    let label = label.to_lowercase();
    if label.contains("meta_title") || label.contains("title") {
        Some("meta_title")
    } else if label.contains("meta_description") || label.contains("description") {
        Some("meta_description")
    } else if label.contains("outline") {
        Some("outline")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(name: &str, category: Option<&str>) -> Model {
        let now = chrono::Utc::now().fixed_offset();
        Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: name.into(),
            alias: None,
            description: None,
            template: "Write about {{keyword}}".into(),
            variables: Some(serde_json::json!(["keyword", 3])),
            category: category.map(str::to_string),
            is_active: true,
            is_system: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn prompt_type_prefers_category() {
        assert_eq!(prompt("Blog outline", Some("meta_title")).prompt_type(), "meta_title");
        assert_eq!(
            prompt("Anything", Some("SEO description")).prompt_type(),
            "meta_description"
        );
    }

    #[test]
    fn prompt_type_falls_back_to_name() {
        assert_eq!(prompt("Article Outline", Some("blog")).prompt_type(), "outline");
        assert_eq!(prompt("Page Title ideas", None).prompt_type(), "meta_title");
        assert_eq!(prompt("Blog article", None).prompt_type(), "content");
    }

    #[test]
    fn variable_names_skip_non_strings() {
        assert_eq!(prompt("x", None).variable_names(), vec!["keyword".to_string()]);
    }
}
