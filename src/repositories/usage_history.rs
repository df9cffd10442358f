//! # Usage History Repository

use crate::error::RepositoryError;
use crate::models::usage_history::{
    ActiveModel as UsageActiveModel, Column, Entity as UsageHistory, Model as UsageModel,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

pub struct UsageHistoryRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UsageHistoryRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or overwrite the row for `(tenant_id, month)`.
    pub async fn upsert<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        month: &str,
        tokens_used: i64,
        pages_generated: i32,
    ) -> Result<UsageModel, RepositoryError> {
        let now = Utc::now();
        let existing = UsageHistory::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Month.eq(month))
            .one(conn)
            .await?;

        match existing {
            Some(row) => {
                let mut active = row.into_active_model();
                active.tokens_used = Set(tokens_used);
                active.pages_generated = Set(pages_generated);
                active.updated_at = Set(now.into());
                active
                    .update(conn)
                    .await
                    .map_err(RepositoryError::database_error)
            }
            None => UsageActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                month: Set(month.to_string()),
                tokens_used: Set(tokens_used),
                pages_generated: Set(pages_generated),
                api_calls: Set(0),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(conn)
            .await
            .map_err(RepositoryError::database_error),
        }
    }

    /// Most recent `limit` months for a tenant, newest first.
    pub async fn recent(
        &self,
        tenant_id: Uuid,
        limit: u64,
    ) -> Result<Vec<UsageModel>, RepositoryError> {
        UsageHistory::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by_desc(Column::Month)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
