//! # Content Generation Repository
//!
//! Generation CRUD plus the queue operations used by the generation worker:
//! atomic claiming of due rows and terminal/retry state transitions.

use crate::error::RepositoryError;
use crate::models::content_generation::{
    ActiveModel as GenerationActiveModel, Column, Entity as ContentGeneration, GenerationStatus,
    Model as GenerationModel,
};
use crate::repositories::{Paged, Pagination, search_term};
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewGeneration {
    pub tenant_id: Uuid,
    pub page_id: Uuid,
    pub prompt_id: Uuid,
    pub prompt_type: String,
    pub prompt_template: String,
    pub variables: Option<Value>,
    pub additional_instructions: Option<String>,
    pub ai_model: Option<String>,
    pub execution_mode: String,
    pub status: GenerationStatus,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationFilter {
    pub status: Option<String>,
    pub page_id: Option<Uuid>,
    pub prompt_type: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationContentChanges {
    pub generated_content: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

pub struct ContentGenerationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ContentGenerationRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewGeneration) -> Result<GenerationModel, RepositoryError> {
        let now = Utc::now();
        let processing = request.status == GenerationStatus::Processing;

        GenerationActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            page_id: Set(request.page_id),
            prompt_id: Set(Some(request.prompt_id)),
            prompt_type: Set(request.prompt_type),
            prompt_template: Set(request.prompt_template),
            variables: Set(request.variables),
            additional_instructions: Set(request.additional_instructions),
            generated_content: Set(None),
            meta_title: Set(None),
            meta_description: Set(None),
            tokens_used: Set(0),
            ai_model: Set(request.ai_model),
            execution_mode: Set(request.execution_mode),
            status: Set(request.status.as_str().to_string()),
            attempts: Set(if processing { 1 } else { 0 }),
            error_message: Set(None),
            next_attempt_at: Set(None),
            started_at: Set(processing.then(|| now.into())),
            published_at: Set(None),
            completed_at: Set(None),
            created_by: Set(request.created_by),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(
        &self,
        generation_id: Uuid,
    ) -> Result<Option<GenerationModel>, RepositoryError> {
        ContentGeneration::find_by_id(generation_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, generation_id: Uuid) -> Result<GenerationModel, RepositoryError> {
        self.find_by_id(generation_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Generation not found".to_string()))
    }

    /// Generations of a tenant, newest first.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: GenerationFilter,
        pagination: Pagination,
    ) -> Result<Paged<GenerationModel>, RepositoryError> {
        let mut query = ContentGeneration::find().filter(Column::TenantId.eq(tenant_id));
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }
        if let Some(page_id) = filter.page_id {
            query = query.filter(Column::PageId.eq(page_id));
        }
        if let Some(prompt_type) = filter.prompt_type {
            query = query.filter(Column::PromptType.eq(prompt_type));
        }
        if let Some(term) = search_term(filter.search.as_deref()) {
            query = query.filter(
                Condition::any()
                    .add(Column::GeneratedContent.contains(&term))
                    .add(Column::MetaTitle.contains(&term)),
            );
        }
        query = query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id);

        let paginator = query.paginate(self.db, pagination.per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(pagination.page - 1).await?;
        Ok(Paged {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        })
    }

    pub async fn update_content(
        &self,
        generation: GenerationModel,
        changes: GenerationContentChanges,
    ) -> Result<GenerationModel, RepositoryError> {
        if !generation.is_completed() {
            return Err(RepositoryError::Rule(
                "Only completed generations can be edited.".to_string(),
            ));
        }

        let mut active = generation.into_active_model();
        if let Some(content) = changes.generated_content {
            active.generated_content = Set(Some(content));
        }
        if let Some(title) = changes.meta_title {
            active.meta_title = Set(Some(title));
        }
        if let Some(description) = changes.meta_description {
            active.meta_description = Set(Some(description));
        }
        active.updated_at = Set(Utc::now().into());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn publish(
        &self,
        generation: GenerationModel,
    ) -> Result<GenerationModel, RepositoryError> {
        if !generation.is_completed() {
            return Err(RepositoryError::Rule(
                "Only completed generations can be published.".to_string(),
            ));
        }

        let now = Utc::now();
        let mut active = generation.into_active_model();
        active.published_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Put a failed generation back in the queue with a fresh attempt budget.
    pub async fn retry(&self, generation: GenerationModel) -> Result<GenerationModel, RepositoryError> {
        if generation.status() != Some(GenerationStatus::Failed) {
            return Err(RepositoryError::Rule(
                "Only failed generations can be retried.".to_string(),
            ));
        }

        let mut active = generation.into_active_model();
        active.status = Set(GenerationStatus::Pending.as_str().to_string());
        active.attempts = Set(0);
        active.error_message = Set(None);
        active.next_attempt_at = Set(None);
        active.started_at = Set(None);
        active.completed_at = Set(None);
        active.updated_at = Set(Utc::now().into());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete(&self, generation_id: Uuid) -> Result<(), RepositoryError> {
        let result = ContentGeneration::delete_by_id(generation_id)
            .exec(self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound("Generation not found".to_string()));
        }
        Ok(())
    }

    /// Atomically move up to `batch` due rows to `processing`, incrementing
    /// their attempt counter. Due rows are pending rows whose retry time has
    /// passed, plus `processing` rows started more than `stale_after` ago
    /// that still have attempts left (their worker died mid-run).
    /// Returns the rows this call claimed.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
        max_attempts: i32,
        batch: u64,
    ) -> Result<Vec<GenerationModel>, RepositoryError> {
        let txn = self.db.begin().await?;
        let pending = GenerationStatus::Pending.as_str();
        let processing = GenerationStatus::Processing.as_str();

        let claimable = Condition::any()
            .add(
                Condition::all().add(Column::Status.eq(pending)).add(
                    Condition::any()
                        .add(Column::NextAttemptAt.is_null())
                        .add(Column::NextAttemptAt.lte(now)),
                ),
            )
            .add(
                Condition::all()
                    .add(Column::Status.eq(processing))
                    .add(Column::StartedAt.lt(now - stale_after))
                    .add(Column::Attempts.lt(max_attempts)),
            );

        let due: Vec<Uuid> = ContentGeneration::find()
            .select_only()
            .column(Column::Id)
            .filter(claimable.clone())
            .order_by_asc(Column::CreatedAt)
            .limit(batch)
            .into_tuple()
            .all(&txn)
            .await?;

        if due.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let updated = ContentGeneration::update_many()
            .col_expr(Column::Status, Expr::value(processing))
            .col_expr(Column::StartedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .filter(Column::Id.is_in(due.clone()))
            .filter(claimable)
            .exec(&txn)
            .await?;

        let claimed = if updated.rows_affected > 0 {
            ContentGeneration::find()
                .filter(Column::Id.is_in(due))
                .filter(Column::Status.eq(processing))
                .filter(Column::StartedAt.eq(now))
                .order_by_asc(Column::CreatedAt)
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed)
    }

    /// Fail `processing` rows abandoned longer than `stale_after` that have
    /// used up their attempts. Returns how many rows were failed.
    pub async fn fail_abandoned(
        &self,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
        max_attempts: i32,
    ) -> Result<u64, RepositoryError> {
        let result = ContentGeneration::update_many()
            .col_expr(
                Column::Status,
                Expr::value(GenerationStatus::Failed.as_str()),
            )
            .col_expr(
                Column::ErrorMessage,
                Expr::value("Job failed after maximum retry attempts: worker stopped while processing"),
            )
            .col_expr(Column::CompletedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq(GenerationStatus::Processing.as_str()))
            .filter(Column::StartedAt.lt(now - stale_after))
            .filter(Column::Attempts.gte(max_attempts))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn mark_completed<C: ConnectionTrait>(
        conn: &C,
        generation: GenerationModel,
        content: String,
        tokens_used: i64,
    ) -> Result<GenerationModel, RepositoryError> {
        let now = Utc::now();
        let mut active = generation.into_active_model();
        active.status = Set(GenerationStatus::Completed.as_str().to_string());
        active.generated_content = Set(Some(content));
        active.tokens_used = Set(tokens_used);
        active.error_message = Set(None);
        active.next_attempt_at = Set(None);
        active.completed_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active
            .update(conn)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Record a failed attempt. With `retry_at` the row returns to `pending`
    /// and becomes due at that time; otherwise it stays `failed`.
    pub async fn record_failure(
        &self,
        generation: GenerationModel,
        error_message: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<GenerationModel, RepositoryError> {
        let now = Utc::now();
        let status = if retry_at.is_some() {
            GenerationStatus::Pending
        } else {
            GenerationStatus::Failed
        };

        let mut active = generation.into_active_model();
        active.status = Set(status.as_str().to_string());
        active.error_message = Set(Some(error_message));
        active.next_attempt_at = Set(retry_at.map(Into::into));
        active.completed_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// `(status, count)` pairs, for one tenant or platform-wide.
    pub async fn count_by_status(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        let mut query = ContentGeneration::find()
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::Status);
        if let Some(tenant_id) = tenant_id {
            query = query.filter(Column::TenantId.eq(tenant_id));
        }
        query
            .into_tuple()
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Completed generations of a tenant created in `[from, to)`.
    pub async fn count_completed_between(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        ContentGeneration::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Status.eq(GenerationStatus::Completed.as_str()))
            .filter(Column::CreatedAt.gte(from))
            .filter(Column::CreatedAt.lt(to))
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// `(created_at, tokens_used)` of every generation since `since`.
    pub async fn activity_since(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTimeWithTimeZone, i64)>, RepositoryError> {
        ContentGeneration::find()
            .select_only()
            .column(Column::CreatedAt)
            .column(Column::TokensUsed)
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::CreatedAt.gte(since))
            .into_tuple()
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn tokens_total(&self, tenant_id: Uuid) -> Result<i64, RepositoryError> {
        let tokens: Vec<i64> = ContentGeneration::find()
            .select_only()
            .column(Column::TokensUsed)
            .filter(Column::TenantId.eq(tenant_id))
            .into_tuple()
            .all(self.db)
            .await?;
        Ok(tokens.into_iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::repositories::page::{NewPage, PageRepository};
    use crate::repositories::prompt::{NewPrompt, PromptRepository};
    use crate::repositories::tenant::{NewTenant, TenantRepository};

    struct Fixture {
        tenant_id: Uuid,
        page_id: Uuid,
        prompt_id: Uuid,
    }

    async fn fixture(db: &DatabaseConnection) -> Fixture {
        let tenant = TenantRepository::new(db)
            .create(NewTenant {
                name: "Acme".into(),
                domain: None,
                subdomain: None,
                plan_type: "free".into(),
                tokens_monthly_limit: 1000,
                status: None,
                theme_config: None,
                brand_config: None,
                features: None,
            })
            .await
            .unwrap();
        let page = PageRepository::new(db)
            .create(
                tenant.id,
                NewPage {
                    url_path: "/blog".into(),
                    keyword: "rust".into(),
                    category: None,
                    language: None,
                    cms_type: None,
                    cms_page_id: None,
                    status: None,
                    priority: None,
                    metadata: None,
                },
            )
            .await
            .unwrap();
        let prompt = PromptRepository::new(db)
            .create(
                tenant.id,
                NewPrompt {
                    name: "Blog".into(),
                    alias: None,
                    description: None,
                    template: "Write about {{keyword}}".into(),
                    variables: vec!["keyword".into()],
                    category: None,
                    is_active: true,
                    is_system: false,
                },
            )
            .await
            .unwrap();
        Fixture {
            tenant_id: tenant.id,
            page_id: page.id,
            prompt_id: prompt.id,
        }
    }

    fn lease() -> chrono::Duration {
        chrono::Duration::minutes(10)
    }

    fn new_generation(f: &Fixture) -> NewGeneration {
        NewGeneration {
            tenant_id: f.tenant_id,
            page_id: f.page_id,
            prompt_id: f.prompt_id,
            prompt_type: "content".into(),
            prompt_template: "Write about {{keyword}}".into(),
            variables: Some(serde_json::json!({"keyword": "rust"})),
            additional_instructions: None,
            ai_model: Some("gpt-4o-mini".into()),
            execution_mode: "async".into(),
            status: GenerationStatus::Pending,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn claim_due_moves_rows_to_processing_once() {
        let db = test_connection().await;
        let f = fixture(&db).await;
        let repo = ContentGenerationRepository::new(&db);
        let created = repo.create(new_generation(&f)).await.unwrap();

        let claimed = repo.claim_due(Utc::now(), lease(), 3, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, created.id);
        assert_eq!(claimed[0].status, "processing");
        assert_eq!(claimed[0].attempts, 1);

        assert!(repo.claim_due(Utc::now(), lease(), 3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_processing_rows_are_reclaimed() {
        let db = test_connection().await;
        let f = fixture(&db).await;
        let repo = ContentGenerationRepository::new(&db);
        let created = repo.create(new_generation(&f)).await.unwrap();
        let now = Utc::now();
        repo.claim_due(now, lease(), 2, 10).await.unwrap();

        // Still within the lease: the first worker owns it.
        let soon = now + chrono::Duration::minutes(5);
        assert!(repo.claim_due(soon, lease(), 2, 10).await.unwrap().is_empty());

        let later = now + chrono::Duration::hours(1);
        let reclaimed = repo.claim_due(later, lease(), 2, 10).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, created.id);
        assert_eq!(reclaimed[0].attempts, 2);

        // Out of attempts: never claimed again, failed instead.
        let much_later = later + chrono::Duration::hours(1);
        assert!(repo.claim_due(much_later, lease(), 2, 10).await.unwrap().is_empty());
        assert_eq!(repo.fail_abandoned(much_later, lease(), 2).await.unwrap(), 1);

        let failed = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        assert!(failed.error_message.unwrap().contains("maximum retry attempts"));
        assert!(repo.claim_due(much_later, lease(), 3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_at_in_future_is_not_due() {
        let db = test_connection().await;
        let f = fixture(&db).await;
        let repo = ContentGenerationRepository::new(&db);
        repo.create(new_generation(&f)).await.unwrap();
        let claimed = repo.claim_due(Utc::now(), lease(), 3, 10).await.unwrap().remove(0);

        let retry_at = Utc::now() + chrono::Duration::seconds(60);
        let requeued = repo
            .record_failure(claimed, "boom".into(), Some(retry_at))
            .await
            .unwrap();
        assert_eq!(requeued.status, "pending");
        assert_eq!(requeued.error_message.as_deref(), Some("boom"));

        assert!(repo.claim_due(Utc::now(), lease(), 3, 10).await.unwrap().is_empty());
        let later = repo
            .claim_due(retry_at + chrono::Duration::seconds(1), lease(), 3, 10)
            .await
            .unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].attempts, 2);
    }

    #[tokio::test]
    async fn publish_and_retry_guard_status() {
        let db = test_connection().await;
        let f = fixture(&db).await;
        let repo = ContentGenerationRepository::new(&db);
        let generation = repo.create(new_generation(&f)).await.unwrap();

        assert!(matches!(
            repo.publish(generation.clone()).await,
            Err(RepositoryError::Rule(_))
        ));
        assert!(matches!(
            repo.retry(generation.clone()).await,
            Err(RepositoryError::Rule(_))
        ));

        let failed = repo
            .record_failure(generation, "nope".into(), None)
            .await
            .unwrap();
        let retried = repo.retry(failed).await.unwrap();
        assert_eq!(retried.status, "pending");
        assert_eq!(retried.attempts, 0);
        assert!(retried.error_message.is_none());

        let claimed = repo.claim_due(Utc::now(), lease(), 3, 1).await.unwrap().remove(0);
        let done = ContentGenerationRepository::mark_completed(&db, claimed, "text".into(), 12)
            .await
            .unwrap();
        let published = repo.publish(done).await.unwrap();
        assert!(published.published_at.is_some());
    }

    #[tokio::test]
    async fn status_counts_group_rows() {
        let db = test_connection().await;
        let f = fixture(&db).await;
        let repo = ContentGenerationRepository::new(&db);
        repo.create(new_generation(&f)).await.unwrap();
        repo.create(new_generation(&f)).await.unwrap();

        let counts = repo.count_by_status(Some(f.tenant_id)).await.unwrap();
        assert_eq!(counts, vec![("pending".to_string(), 2)]);
    }
}
