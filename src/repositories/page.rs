//! # Page Repository
//!
//! Tenant-scoped page CRUD with filtering, sorting and generation counts.

use crate::error::RepositoryError;
use crate::models::content_generation;
use crate::models::page::{
    ActiveModel as PageActiveModel, Column, Entity as Page, Model as PageModel,
};
use crate::repositories::{Paged, Pagination, SortDirection, search_term};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewPage {
    pub url_path: String,
    pub keyword: String,
    pub category: Option<String>,
    pub language: Option<String>,
    pub cms_type: Option<String>,
    pub cms_page_id: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i32>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct PageChanges {
    pub url_path: Option<String>,
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub cms_type: Option<String>,
    pub cms_page_id: Option<String>,
    pub status: Option<String>,
    pub priority: Option<i32>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    pub status: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub search: Option<String>,
}

/// Sortable page columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    UrlPath,
    Keyword,
    Priority,
    Status,
}

impl PageSortField {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "created_at" => Self::CreatedAt,
            "updated_at" => Self::UpdatedAt,
            "url_path" => Self::UrlPath,
            "keyword" => Self::Keyword,
            "priority" => Self::Priority,
            "status" => Self::Status,
            _ => return None,
        })
    }

    fn column(self) -> Column {
        match self {
            Self::CreatedAt => Column::CreatedAt,
            Self::UpdatedAt => Column::UpdatedAt,
            Self::UrlPath => Column::UrlPath,
            Self::Keyword => Column::Keyword,
            Self::Priority => Column::Priority,
            Self::Status => Column::Status,
        }
    }
}

/// A page together with how many generations reference it
#[derive(Debug, Clone)]
pub struct PageWithCount {
    pub page: PageModel,
    pub generations_count: u64,
}

pub struct PageRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> PageRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        request: NewPage,
    ) -> Result<PageModel, RepositoryError> {
        self.ensure_unique_url_path(tenant_id, &request.url_path, None)
            .await?;

        let now = Utc::now();
        PageActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            url_path: Set(request.url_path),
            keyword: Set(request.keyword),
            category: Set(request.category),
            language: Set(request.language.unwrap_or_else(|| "en".to_string())),
            cms_type: Set(request.cms_type),
            cms_page_id: Set(request.cms_page_id),
            status: Set(request.status.unwrap_or_else(|| "draft".to_string())),
            priority: Set(request.priority.unwrap_or(5)),
            metadata: Set(request.metadata),
            last_synced: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, page_id: Uuid) -> Result<Option<PageModel>, RepositoryError> {
        Page::find_by_id(page_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, page_id: Uuid) -> Result<PageModel, RepositoryError> {
        self.find_by_id(page_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Page not found".to_string()))
    }

    /// Page by id, only when it belongs to `tenant_id`.
    pub async fn find_in_tenant(
        &self,
        tenant_id: Uuid,
        page_id: Uuid,
    ) -> Result<Option<PageModel>, RepositoryError> {
        Page::find_by_id(page_id)
            .filter(Column::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        filter: PageFilter,
        sort: PageSortField,
        direction: SortDirection,
        pagination: Pagination,
    ) -> Result<Paged<PageWithCount>, RepositoryError> {
        let mut query = Page::find().filter(Column::TenantId.eq(tenant_id));
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }
        if let Some(category) = filter.category {
            query = query.filter(Column::Category.eq(category));
        }
        if let Some(language) = filter.language {
            query = query.filter(Column::Language.eq(language));
        }
        if let Some(term) = search_term(filter.search.as_deref()) {
            query = query.filter(
                Condition::any()
                    .add(Column::UrlPath.contains(&term))
                    .add(Column::Keyword.contains(&term)),
            );
        }
        query = query
            .order_by(sort.column(), direction.into())
            .order_by_desc(Column::Id);

        let paginator = query.paginate(self.db, pagination.per_page);
        let total = paginator.num_items().await?;
        let pages = paginator.fetch_page(pagination.page - 1).await?;

        let mut items = Vec::with_capacity(pages.len());
        for page in pages {
            let generations_count = self.generations_count(page.id).await?;
            items.push(PageWithCount {
                page,
                generations_count,
            });
        }

        Ok(Paged {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        })
    }

    pub async fn generations_count(&self, page_id: Uuid) -> Result<u64, RepositoryError> {
        content_generation::Entity::find()
            .filter(content_generation::Column::PageId.eq(page_id))
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Generations of a page, newest first.
    pub async fn generations(
        &self,
        page_id: Uuid,
    ) -> Result<Vec<content_generation::Model>, RepositoryError> {
        content_generation::Entity::find()
            .filter(content_generation::Column::PageId.eq(page_id))
            .order_by_desc(content_generation::Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn update(
        &self,
        page: PageModel,
        changes: PageChanges,
    ) -> Result<PageModel, RepositoryError> {
        if let Some(url_path) = changes.url_path.as_deref() {
            self.ensure_unique_url_path(page.tenant_id, url_path, Some(page.id))
                .await?;
        }

        let mut active = page.into_active_model();
        if let Some(url_path) = changes.url_path {
            active.url_path = Set(url_path);
        }
        if let Some(keyword) = changes.keyword {
            active.keyword = Set(keyword);
        }
        if let Some(category) = changes.category {
            active.category = Set(Some(category));
        }
        if let Some(language) = changes.language {
            active.language = Set(language);
        }
        if let Some(cms_type) = changes.cms_type {
            active.cms_type = Set(Some(cms_type));
        }
        if let Some(cms_page_id) = changes.cms_page_id {
            active.cms_page_id = Set(Some(cms_page_id));
        }
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        if let Some(priority) = changes.priority {
            active.priority = Set(priority);
        }
        if let Some(metadata) = changes.metadata {
            active.metadata = Set(Some(metadata));
        }
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Delete a page that no generation references.
    pub async fn delete(&self, page: PageModel) -> Result<(), RepositoryError> {
        if self.generations_count(page.id).await? > 0 {
            return Err(RepositoryError::Rule(
                "Cannot delete page with existing content generations.".to_string(),
            ));
        }
        Page::delete_by_id(page.id).exec(self.db).await?;
        Ok(())
    }

    /// `(status, count)` for every status present in the tenant.
    pub async fn count_by_status(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        Page::find()
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "count")
            .filter(Column::TenantId.eq(tenant_id))
            .group_by(Column::Status)
            .into_tuple()
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn ensure_unique_url_path(
        &self,
        tenant_id: Uuid,
        url_path: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let mut query = Page::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::UrlPath.eq(url_path));
        if let Some(id) = exclude {
            query = query.filter(Column::Id.ne(id));
        }
        if query.count(self.db).await? > 0 {
            return Err(RepositoryError::validation(
                "url_path",
                "The url path has already been taken.",
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

    fn new_page(url_path: &str, keyword: &str, priority: i32) -> NewPage {
        NewPage {
            url_path: url_path.into(),
            keyword: keyword.into(),
            category: None,
            language: None,
            cms_type: None,
            cms_page_id: None,
            status: None,
            priority: Some(priority),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn url_path_is_unique_per_tenant_only() {
        let db = test_connection().await;
        let first = tenant_id(&db, "One").await;
        let second = tenant_id(&db, "Two").await;
        let repo = PageRepository::new(&db);

        let page = repo.create(first, new_page("/pricing", "pricing", 5)).await.unwrap();
        assert_eq!(page.status, "draft");
        assert_eq!(page.language, "en");

        let err = repo
            .create(first, new_page("/pricing", "other", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation { field: "url_path", .. }));

        repo.create(second, new_page("/pricing", "pricing", 5)).await.unwrap();
        assert!(repo.find_in_tenant(second, page.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sorts_and_searches() {
        let db = test_connection().await;
        let tenant = tenant_id(&db, "One").await;
        let repo = PageRepository::new(&db);
        repo.create(tenant, new_page("/a", "rust web", 2)).await.unwrap();
        repo.create(tenant, new_page("/b", "seo tips", 9)).await.unwrap();

        let by_priority = repo
            .list(
                tenant,
                PageFilter::default(),
                PageSortField::Priority,
                SortDirection::Desc,
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_priority.items[0].page.url_path, "/b");
        assert_eq!(by_priority.items[0].generations_count, 0);

        let searched = repo
            .list(
                tenant,
                PageFilter {
                    search: Some("rust".into()),
                    ..Default::default()
                },
                PageSortField::default(),
                SortDirection::default(),
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(searched.total, 1);
        assert_eq!(searched.items[0].page.url_path, "/a");
    }

    #[test]
    fn sort_field_parsing() {
        assert_eq!(PageSortField::parse("keyword"), Some(PageSortField::Keyword));
        assert_eq!(PageSortField::parse("tenant_id"), None);
    }
}
