//! # Tenant Repository
//!
//! CRUD for tenants plus the token accounting primitives (atomic quota
//! checks and monthly close-out).

use crate::error::RepositoryError;
use crate::models::tenant::{
    self, ActiveModel as TenantActiveModel, Column, Entity as Tenant, Model as TenantModel,
    usage_period_for,
};
use crate::models::{content_generation, page, user};
use crate::repositories::{Paged, Pagination};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value;
use uuid::Uuid;

/// Data for creating a new tenant
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub plan_type: String,
    pub tokens_monthly_limit: i64,
    pub status: Option<String>,
    pub theme_config: Option<Value>,
    pub brand_config: Option<Value>,
    pub features: Option<String>,
}

/// Partial tenant update; `None` leaves a field untouched, an empty
/// `domain`/`subdomain` clears it.
#[derive(Debug, Clone, Default)]
pub struct TenantChanges {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub plan_type: Option<String>,
    pub tokens_monthly_limit: Option<i64>,
    pub status: Option<String>,
    pub theme_config: Option<Value>,
    pub brand_config: Option<Value>,
    pub features: Option<String>,
}

/// Related row counts shown alongside a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantCounts {
    pub users: u64,
    pub pages: u64,
    pub generations: u64,
}

/// Repository for Tenant database operations
pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewTenant) -> Result<TenantModel, RepositoryError> {
        let domain = non_empty(request.domain);
        let subdomain = non_empty(request.subdomain);
        self.ensure_unique_host(None, domain.as_deref(), subdomain.as_deref())
            .await?;

        let now = Utc::now();
        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            domain: Set(domain),
            subdomain: Set(subdomain),
            plan_type: Set(request.plan_type),
            tokens_monthly_limit: Set(request.tokens_monthly_limit),
            tokens_used_current: Set(0),
            usage_period: Set(usage_period_for(now)),
            status: Set(request
                .status
                .unwrap_or_else(|| tenant::STATUS_ACTIVE.to_string())),
            theme_config: Set(request.theme_config),
            brand_config: Set(request.brand_config),
            features: Set(request.features.unwrap_or_default()),
            stripe_customer_id: Set(None),
            stripe_subscription_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        tenant
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find_by_id(tenant_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, tenant_id: Uuid) -> Result<TenantModel, RepositoryError> {
        self.find_by_id(tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))
    }

    pub async fn find_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find()
            .filter(Column::Subdomain.eq(subdomain))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// List tenants newest first, optionally restricted to a single tenant.
    pub async fn list(
        &self,
        only: Option<Uuid>,
        pagination: Pagination,
    ) -> Result<Paged<TenantModel>, RepositoryError> {
        let mut query = Tenant::find().order_by_desc(Column::CreatedAt);
        if let Some(tenant_id) = only {
            query = query.filter(Column::Id.eq(tenant_id));
        }

        let paginator = query.paginate(self.db, pagination.per_page);
        let total = paginator
            .num_items()
            .await
            .map_err(RepositoryError::database_error)?;
        let items = paginator
            .fetch_page(pagination.page - 1)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(Paged {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        })
    }

    pub async fn counts(&self, tenant_id: Uuid) -> Result<TenantCounts, RepositoryError> {
        let users = user::Entity::find()
            .filter(user::Column::TenantId.eq(tenant_id))
            .count(self.db)
            .await?;
        let pages = page::Entity::find()
            .filter(page::Column::TenantId.eq(tenant_id))
            .count(self.db)
            .await?;
        let generations = content_generation::Entity::find()
            .filter(content_generation::Column::TenantId.eq(tenant_id))
            .count(self.db)
            .await?;

        Ok(TenantCounts {
            users,
            pages,
            generations,
        })
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        changes: TenantChanges,
    ) -> Result<TenantModel, RepositoryError> {
        let tenant = self.get(tenant_id).await?;

        let domain = changes.domain.map(|d| non_empty(Some(d)));
        let subdomain = changes.subdomain.map(|s| non_empty(Some(s)));
        self.ensure_unique_host(
            Some(tenant_id),
            domain.as_ref().and_then(|d| d.as_deref()),
            subdomain.as_ref().and_then(|s| s.as_deref()),
        )
        .await?;

        let mut active = tenant.into_active_model();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(domain) = domain {
            active.domain = Set(domain);
        }
        if let Some(subdomain) = subdomain {
            active.subdomain = Set(subdomain);
        }
        if let Some(plan_type) = changes.plan_type {
            active.plan_type = Set(plan_type);
        }
        if let Some(limit) = changes.tokens_monthly_limit {
            active.tokens_monthly_limit = Set(limit);
        }
        if let Some(status) = changes.status {
            active.status = Set(status);
        }
        if let Some(theme) = changes.theme_config {
            active.theme_config = Set(Some(theme));
        }
        if let Some(brand) = changes.brand_config {
            active.brand_config = Set(Some(brand));
        }
        if let Some(features) = changes.features {
            active.features = Set(features);
        }
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Delete a tenant and everything scoped to it. Refused while any user
    /// of the tenant is still active.
    pub async fn delete(&self, tenant_id: Uuid) -> Result<(), RepositoryError> {
        let tenant = self.get(tenant_id).await?;

        let active_users = user::Entity::find()
            .filter(user::Column::TenantId.eq(tenant_id))
            .filter(user::Column::IsActive.eq(true))
            .count(self.db)
            .await?;
        if active_users > 0 {
            return Err(RepositoryError::Rule(
                "Cannot delete tenant with active users. Please deactivate all users first."
                    .to_string(),
            ));
        }

        Tenant::delete_by_id(tenant.id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }

    /// Reserve `tokens` against the monthly limit. Returns `false` without
    /// touching the counter when the reservation would exceed the limit.
    pub async fn check_and_update_token_usage(
        &self,
        tenant_id: Uuid,
        tokens: i64,
    ) -> Result<bool, RepositoryError> {
        let result = Tenant::update_many()
            .col_expr(
                Column::TokensUsedCurrent,
                Expr::col(Column::TokensUsedCurrent).add(tokens),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(tenant_id))
            .filter(
                Expr::col(Column::TokensUsedCurrent)
                    .lte(Expr::col(Column::TokensMonthlyLimit).sub(tokens)),
            )
            .exec(self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Unconditionally add consumed tokens to the current counter and return
    /// the tenant as it stands after the increment. Run inside the caller's
    /// transaction, the row stays locked until commit, so `after - tokens`
    /// is the exact counter this increment started from.
    pub async fn add_token_usage<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        tokens: i64,
    ) -> Result<TenantModel, RepositoryError> {
        let result = Tenant::update_many()
            .col_expr(
                Column::TokensUsedCurrent,
                Expr::col(Column::TokensUsedCurrent).add(tokens),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(tenant_id))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound("Tenant not found".to_string()));
        }

        Tenant::find_by_id(tenant_id)
            .one(conn)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))
    }

    /// Tenants whose counter still belongs to a month other than `period`.
    pub async fn with_stale_usage_period(
        &self,
        period: &str,
    ) -> Result<Vec<TenantModel>, RepositoryError> {
        Tenant::find()
            .filter(Column::UsagePeriod.ne(period))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Zero the counter and move the tenant to `period`, only if it is still
    /// on `previous_period` and the counter still reads `expected_used`.
    /// Returns whether this call performed the reset.
    pub async fn reset_usage_period<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        previous_period: &str,
        expected_used: i64,
        period: &str,
    ) -> Result<bool, RepositoryError> {
        let result = Tenant::update_many()
            .col_expr(Column::TokensUsedCurrent, Expr::value(0i64))
            .col_expr(Column::UsagePeriod, Expr::value(period))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(tenant_id))
            .filter(Column::UsagePeriod.eq(previous_period))
            .filter(Column::TokensUsedCurrent.eq(expected_used))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn count_by_status(&self, status: Option<&str>) -> Result<u64, RepositoryError> {
        let mut query = Tenant::find();
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        query
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Sum of `tokens_used_current` across all tenants.
    pub async fn total_tokens_used(&self) -> Result<i64, RepositoryError> {
        let counters: Vec<i64> = Tenant::find()
            .select_only()
            .column(Column::TokensUsedCurrent)
            .into_tuple()
            .all(self.db)
            .await?;
        Ok(counters.into_iter().sum())
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<TenantModel>, RepositoryError> {
        Tenant::find()
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    async fn ensure_unique_host(
        &self,
        exclude: Option<Uuid>,
        domain: Option<&str>,
        subdomain: Option<&str>,
    ) -> Result<(), RepositoryError> {
        if let Some(domain) = domain {
            let mut query = Tenant::find().filter(Column::Domain.eq(domain));
            if let Some(id) = exclude {
                query = query.filter(Column::Id.ne(id));
            }
            if query.count(self.db).await? > 0 {
                return Err(RepositoryError::validation(
                    "domain",
                    "The domain has already been taken.",
                ));
            }
        }

        if let Some(subdomain) = subdomain {
            let mut query = Tenant::find().filter(Column::Subdomain.eq(subdomain));
            if let Some(id) = exclude {
                query = query.filter(Column::Id.ne(id));
            }
            if query.count(self.db).await? > 0 {
                return Err(RepositoryError::validation(
                    "subdomain",
                    "The subdomain has already been taken.",
                ));
            }
        }

        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
