//! # User Repository
//!
//! Emails are normalised to lowercase on write and lookup.

use crate::error::RepositoryError;
use crate::models::user::{
    ActiveModel as UserActiveModel, Column, Entity as User, Model as UserModel, ROLE_MEMBER,
};
use crate::repositories::{Paged, Pagination, search_term};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Option<String>,
    pub is_super_admin: bool,
    pub is_active: bool,
    pub email_verified: bool,
    pub preferences: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub is_super_admin: Option<bool>,
    /// `Some(None)` detaches the user from its tenant.
    pub tenant_id: Option<Option<Uuid>>,
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub tenant_id: Option<Uuid>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewUser) -> Result<UserModel, RepositoryError> {
        let email = normalize_email(&request.email);
        if self.email_exists(&email).await? {
            return Err(RepositoryError::validation(
                "email",
                "The email has already been taken.",
            ));
        }

        let now = Utc::now();
        UserActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            email: Set(email),
            password_hash: Set(request.password_hash),
            name: Set(request.name),
            avatar: Set(None),
            role: Set(request.role.unwrap_or_else(|| ROLE_MEMBER.to_string())),
            is_super_admin: Set(request.is_super_admin),
            is_active: Set(request.is_active),
            email_verified: Set(request.email_verified),
            preferences: Set(request.preferences),
            last_login: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserModel>, RepositoryError> {
        User::find_by_id(user_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get(&self, user_id: Uuid) -> Result<UserModel, RepositoryError> {
        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, RepositoryError> {
        User::find()
            .filter(Column::Email.eq(normalize_email(email)))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        Ok(User::find()
            .filter(Column::Email.eq(normalize_email(email)))
            .count(self.db)
            .await?
            > 0)
    }

    pub async fn list(
        &self,
        filter: UserFilter,
        pagination: Pagination,
    ) -> Result<Paged<UserModel>, RepositoryError> {
        let mut query = User::find().order_by_desc(Column::CreatedAt);
        if let Some(tenant_id) = filter.tenant_id {
            query = query.filter(Column::TenantId.eq(tenant_id));
        }
        if let Some(role) = filter.role {
            query = query.filter(Column::Role.eq(role));
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(Column::IsActive.eq(is_active));
        }
        if let Some(term) = search_term(filter.search.as_deref()) {
            query = query.filter(
                Condition::any()
                    .add(Column::Email.contains(&term))
                    .add(Column::Name.contains(&term)),
            );
        }

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

    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<UserModel>, RepositoryError> {
        User::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by_asc(Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        changes: UserChanges,
    ) -> Result<UserModel, RepositoryError> {
        let user = self.get(user_id).await?;
        let mut active = user.into_active_model();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(role) = changes.role {
            active.role = Set(role);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(is_super_admin) = changes.is_super_admin {
            active.is_super_admin = Set(is_super_admin);
        }
        if let Some(tenant_id) = changes.tenant_id {
            active.tenant_id = Set(tenant_id);
        }
        if let Some(hash) = changes.password_hash {
            active.password_hash = Set(hash);
        }
        if let Some(avatar) = changes.avatar {
            active.avatar = Set(Some(avatar));
        }
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn touch_last_login(&self, user: UserModel) -> Result<UserModel, RepositoryError> {
        let now = Utc::now();
        let mut active = user.into_active_model();
        active.last_login = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        let result = User::delete_by_id(user_id).exec(self.db).await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    pub async fn count_active(&self, tenant_id: Option<Uuid>) -> Result<u64, RepositoryError> {
        let mut query = User::find().filter(Column::IsActive.eq(true));
        if let Some(tenant_id) = tenant_id {
            query = query.filter(Column::TenantId.eq(tenant_id));
        }
        query
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Active super admins, oldest first.
    pub async fn active_super_admins(&self) -> Result<Vec<UserModel>, RepositoryError> {
        User::find()
            .filter(Column::IsSuperAdmin.eq(true))
            .filter(Column::IsActive.eq(true))
            .order_by_asc(Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn count_all(&self) -> Result<u64, RepositoryError> {
        User::find()
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
