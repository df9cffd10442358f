//! # Common API Types
//!
//! Shared response envelopes and query parameters used across handlers.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AuthUser, TenantContext};
use crate::error::{ApiError, validation_error};
use crate::repositories::{Paged, Pagination, SortDirection};

/// Page metadata attached to list responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PaginationMeta {
    #[schema(example = 1)]
    pub current_page: u64,
    #[schema(example = 4)]
    pub last_page: u64,
    #[schema(example = 15)]
    pub per_page: u64,
    #[schema(example = 52)]
    pub total: u64,
}

/// Generic paginated response wrapper for list endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn from_paged<M>(paged: Paged<M>, f: impl FnMut(M) -> T) -> Self {
        let meta = PaginationMeta {
            current_page: paged.page,
            last_page: paged.last_page(),
            per_page: paged.per_page,
            total: paged.total,
        };
        Self {
            data: paged.items.into_iter().map(f).collect(),
            meta,
        }
    }
}

/// `{message, data}` envelope returned by create and update endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> MessageResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// `{data}` envelope for single resources
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Plain acknowledgement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub message: String,
}

/// `page`/`per_page` query parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number (default 1)
    pub page: Option<u64>,
    /// Items per page (default 15, max 100)
    pub per_page: Option<u64>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.per_page)
    }
}

/// Treat `Some("")` from a query string as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Tenant a list request runs against: the caller's own, or any tenant a
/// super admin names explicitly.
pub fn scoped_tenant(auth: &AuthUser, ctx: &TenantContext, requested: Option<Uuid>) -> Uuid {
    match requested {
        Some(tenant_id) if auth.is_super_admin() => tenant_id,
        _ => ctx.id(),
    }
}

/// Parse `sort_by`/`sort_direction`, answering 400 for unknown values.
pub fn parse_sort<F: Default>(
    sort_by: Option<&str>,
    sort_direction: Option<&str>,
    parse: impl Fn(&str) -> Option<F>,
) -> Result<(F, SortDirection), ApiError> {
    let field = match sort_by.filter(|s| !s.is_empty()) {
        None => F::default(),
        Some(value) => parse(value).ok_or_else(|| {
            validation_error(
                "Invalid sort field",
                serde_json::json!({ "sort_by": format!("Unsupported sort field '{value}'") }),
            )
        })?,
    };
    let direction = match sort_direction.filter(|s| !s.is_empty()) {
        None => SortDirection::default(),
        Some(value) if value.eq_ignore_ascii_case("asc") => SortDirection::Asc,
        Some(value) if value.eq_ignore_ascii_case("desc") => SortDirection::Desc,
        Some(value) => {
            return Err(validation_error(
                "Invalid sort direction",
                serde_json::json!({ "sort_direction": format!("Unsupported sort direction '{value}'") }),
            ));
        }
    };
    Ok((field, direction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::page::PageSortField;
    use axum::http::StatusCode;

    #[test]
    fn sort_defaults_to_created_at_desc() {
        let (field, direction) = parse_sort(None, None, PageSortField::parse).unwrap();
        assert_eq!(field, PageSortField::CreatedAt);
        assert_eq!(direction, SortDirection::Desc);

        let (field, direction) =
            parse_sort(Some("priority"), Some("ASC"), PageSortField::parse).unwrap();
        assert_eq!(field, PageSortField::Priority);
        assert_eq!(direction, SortDirection::Asc);
    }

    #[test]
    fn unknown_sort_field_is_bad_request() {
        let err = parse_sort(Some("password"), None, PageSortField::parse).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = parse_sort(None, Some("sideways"), PageSortField::parse).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
