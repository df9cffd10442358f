//! ContentGeneration entity model
//!
//! One AI content-creation job. The row is also the queue entry the
//! generation worker claims.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Lifecycle of a generation: pending → processing → completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub const ALL: [GenerationStatus; 4] = [
        GenerationStatus::Pending,
        GenerationStatus::Processing,
        GenerationStatus::Completed,
        GenerationStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const EXECUTION_MODES: &[&str] = &["async", "sync"];

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "content_generations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub page_id: Uuid,

    /// Source prompt (cleared if the prompt is deleted)
    pub prompt_id: Option<Uuid>,

    /// content|meta_title|meta_description|outline
    pub prompt_type: String,

    /// Snapshot of the prompt template at creation time
    pub prompt_template: String,

    /// Variable values (JSON object of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub variables: Option<JsonValue>,

    pub additional_instructions: Option<String>,

    pub generated_content: Option<String>,

    pub meta_title: Option<String>,

    pub meta_description: Option<String>,

    pub tokens_used: i64,

    pub ai_model: Option<String>,

    /// async|sync
    pub execution_mode: String,

    pub status: String,

    /// Number of times the worker has claimed the row
    pub attempts: i32,

    pub error_message: Option<String>,

    /// Earliest time a retry may be claimed
    pub next_attempt_at: Option<DateTimeWithTimeZone>,

    pub started_at: Option<DateTimeWithTimeZone>,

    pub published_at: Option<DateTimeWithTimeZone>,

    pub completed_at: Option<DateTimeWithTimeZone>,

    pub created_by: Option<Uuid>,

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
    #[sea_orm(
        belongs_to = "super::page::Entity",
        from = "Column::PageId",
        to = "super::page::Column::Id"
    )]
    Page,
    #[sea_orm(
        belongs_to = "super::prompt::Entity",
        from = "Column::PromptId",
        to = "super::prompt::Column::Id"
    )]
    Prompt,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::page::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Page.def()
    }
}

impl Related<super::prompt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prompt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> Option<GenerationStatus> {
        GenerationStatus::parse(&self.status)
    }

    pub fn is_completed(&self) -> bool {
        self.status() == Some(GenerationStatus::Completed)
    }

    /// Variable values as ordered `(name, value)` pairs; non-string values are stringified.
    pub fn variable_pairs(&self) -> Vec<(String, String)> {
        let Some(JsonValue::Object(map)) = self.variables.as_ref() else {
            return Vec::new();
        };
        map.iter()
            .map(|(key, value)| {
                let value = match value {
                    JsonValue::String(text) => text.clone(),
                    JsonValue::Null => String::new(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_roundtrip() {
        for status in GenerationStatus::ALL {
            assert_eq!(GenerationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(GenerationStatus::parse("queued"), None);
    }
}
