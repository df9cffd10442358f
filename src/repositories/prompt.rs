//! # Prompt Repository

use crate::error::RepositoryError;
use crate::models::prompt::{
    ActiveModel as PromptActiveModel, Column, Entity as Prompt, Model as PromptModel,
};
use crate::repositories::{Paged, Pagination, SortDirection, search_term};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewPrompt {
    pub name: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub template: String,
    pub variables: Vec<String>,
    pub category: Option<String>,
    pub is_active: bool,
    pub is_system: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PromptChanges {
    pub name: Option<String>,
    /// `Some(None)` clears the alias.
    pub alias: Option<Option<String>>,
    pub description: Option<String>,
    pub template: Option<String>,
    pub variables: Option<Vec<String>>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PromptFilter {
    pub include_system: bool,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Category,
}

impl PromptSortField {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "created_at" => Self::CreatedAt,
            "updated_at" => Self::UpdatedAt,
            "name" => Self::Name,
            "category" => Self::Category,
            _ => return None,
        })
    }

    fn column(self) -> Column {
        match self {
            Self::CreatedAt => Column::CreatedAt,
            Self::UpdatedAt => Column::UpdatedAt,
            Self::Name => Column::Name,
            Self::Category => Column::Category,
        }
    }
}

pub struct PromptRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PromptRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        request: NewPrompt,
    ) -> Result<PromptModel, RepositoryError> {
        if let Some(alias) = request.alias.as_deref() {
            self.ensure_unique_alias(tenant_id, alias, None).await?;
        }

        let now = Utc::now();
        PromptActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(request.name),
            alias: Set(request.alias),
            description: Set(request.description),
            template: Set(request.template),
            variables: Set(Some(json!(request.variables))),
            category: Set(request.category),
            is_active: Set(request.is_active),
            is_system: Set(request.is_system),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, prompt_id: Uuid) -> Result<Option<PromptModel>, RepositoryError> {
        Prompt::find_by_id(prompt_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, prompt_id: Uuid) -> Result<PromptModel, RepositoryError> {
        self.find_by_id(prompt_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Prompt not found".to_string()))
    }

    /// Active prompt usable by `tenant_id`: its own or a system prompt.
    pub async fn find_usable(
        &self,
        tenant_id: Uuid,
        prompt_id: Uuid,
    ) -> Result<Option<PromptModel>, RepositoryError> {
        Prompt::find_by_id(prompt_id)
            .filter(Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(Column::TenantId.eq(tenant_id))
                    .add(Column::IsSystem.eq(true)),
            )
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_system_by_name(
        &self,
        name: &str,
    ) -> Result<Option<PromptModel>, RepositoryError> {
        Prompt::find()
            .filter(Column::IsSystem.eq(true))
            .filter(Column::Name.eq(name))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: PromptFilter,
        sort: PromptSortField,
        direction: SortDirection,
        pagination: Pagination,
    ) -> Result<Paged<PromptModel>, RepositoryError> {
        let mut scope = Condition::any().add(Column::TenantId.eq(tenant_id));
        if filter.include_system {
            scope = scope.add(Column::IsSystem.eq(true));
        }

        let mut query = Prompt::find().filter(scope);
        if let Some(category) = filter.category {
            query = query.filter(Column::Category.eq(category));
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(Column::IsActive.eq(is_active));
        }
        if let Some(term) = search_term(filter.search.as_deref()) {
            query = query.filter(
                Condition::any()
                    .add(Column::Name.contains(&term))
                    .add(Column::Description.contains(&term))
                    .add(Column::Alias.contains(&term)),
            );
        }
        query = query
            .order_by(sort.column(), direction.into())
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

    pub async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<PromptModel>, RepositoryError> {
        Prompt::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by_asc(Column::Name)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Apply changes; `is_system` is never touched here.
    pub async fn update(
        &self,
        prompt: PromptModel,
        changes: PromptChanges,
    ) -> Result<PromptModel, RepositoryError> {
        if let Some(Some(alias)) = changes.alias.as_ref() {
            self.ensure_unique_alias(prompt.tenant_id, alias, Some(prompt.id))
                .await?;
        }

        let mut active = prompt.into_active_model();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(alias) = changes.alias {
            active.alias = Set(alias);
        }
        if let Some(description) = changes.description {
            active.description = Set(Some(description));
        }
        if let Some(template) = changes.template {
            active.template = Set(template);
        }
        if let Some(variables) = changes.variables {
            active.variables = Set(Some(json!(variables)));
        }
        if let Some(category) = changes.category {
            active.category = Set(Some(category));
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete(&self, prompt: PromptModel) -> Result<(), RepositoryError> {
        if prompt.is_system {
            return Err(RepositoryError::Rule(
                "System prompts cannot be deleted.".to_string(),
            ));
        }
        Prompt::delete_by_id(prompt.id).exec(self.db).await?;
        Ok(())
    }

    pub async fn count(
        &self,
        tenant_id: Uuid,
        active_only: bool,
    ) -> Result<u64, RepositoryError> {
        let mut query = Prompt::find().filter(Column::TenantId.eq(tenant_id));
        if active_only {
            query = query.filter(Column::IsActive.eq(true));
        }
        query
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn ensure_unique_alias(
        &self,
        tenant_id: Uuid,
        alias: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let mut query = Prompt::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Alias.eq(alias));
        if let Some(id) = exclude {
            query = query.filter(Column::Id.ne(id));
        }
        if query.count(self.db).await? > 0 {
            return Err(RepositoryError::validation(
                "alias",
                "The alias has already been taken.",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::repositories::tenant::{NewTenant, TenantRepository};

    async fn tenant_id(db: &DatabaseConnection, name: &str) -> Uuid {
        TenantRepository::new(db)
            .create(NewTenant {
                name: name.into(),
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
            .unwrap()
            .id
    }

    fn new_prompt(name: &str, alias: Option<&str>, is_system: bool) -> NewPrompt {
        NewPrompt {
            name: name.into(),
            alias: alias.map(str::to_string),
            description: None,
            template: "Write about {{keyword}}".into(),
            variables: vec!["keyword".into()],
            category: None,
            is_active: true,
            is_system,
        }
    }

    #[tokio::test]
    async fn system_prompts_are_usable_by_every_tenant_and_undeletable() {
        let db = test_connection().await;
        let platform = tenant_id(&db, "Platform").await;
        let customer = tenant_id(&db, "Customer").await;
        let repo = PromptRepository::new(&db);

        let system = repo
            .create(platform, new_prompt("Blog Article", None, true))
            .await
            .unwrap();
        let private = repo
            .create(platform, new_prompt("Private", None, false))
            .await
            .unwrap();

        assert!(repo.find_usable(customer, system.id).await.unwrap().is_some());
        assert!(repo.find_usable(customer, private.id).await.unwrap().is_none());

        let err = repo.delete(system).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Rule(_)));
    }

    #[tokio::test]
    async fn include_system_widens_listing() {
        let db = test_connection().await;
        let platform = tenant_id(&db, "Platform").await;
        let customer = tenant_id(&db, "Customer").await;
        let repo = PromptRepository::new(&db);
        repo.create(platform, new_prompt("System", None, true)).await.unwrap();
        repo.create(customer, new_prompt("Mine", Some("mine"), false)).await.unwrap();

        let own = repo
            .list(
                customer,
                PromptFilter::default(),
                PromptSortField::default(),
                SortDirection::default(),
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(own.total, 1);

        let with_system = repo
            .list(
                customer,
                PromptFilter {
                    include_system: true,
                    ..Default::default()
                },
                PromptSortField::Name,
                SortDirection::Asc,
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(with_system.total, 2);
        assert_eq!(with_system.items[0].name, "Mine");
    }

    #[tokio::test]
    async fn alias_unique_within_tenant() {
        let db = test_connection().await;
        let tenant = tenant_id(&db, "Customer").await;
        let repo = PromptRepository::new(&db);
        repo.create(tenant, new_prompt("One", Some("seo"), false)).await.unwrap();

        let err = repo
            .create(tenant, new_prompt("Two", Some("seo"), false))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation { field: "alias", .. }));
    }

    #[tokio::test]
    async fn alias_can_be_cleared_and_reused() {
        let db = test_connection().await;
        let tenant = tenant_id(&db, "Customer").await;
        let repo = PromptRepository::new(&db);
        let first = repo.create(tenant, new_prompt("One", Some("seo"), false)).await.unwrap();

        let cleared = repo
            .update(
                first,
                PromptChanges {
                    alias: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.alias, None);

        let second = repo.create(tenant, new_prompt("Two", Some("seo"), false)).await.unwrap();
        assert_eq!(second.alias.as_deref(), Some("seo"));

        let untouched = repo.update(second, PromptChanges::default()).await.unwrap();
        assert_eq!(untouched.alias.as_deref(), Some("seo"));
    }
}
