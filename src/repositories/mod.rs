//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! platform entities, with tenant-aware query methods.

use serde::Deserialize;

pub mod api_key;
pub mod content_generation;
pub mod page;
pub mod platform_setting;
pub mod prompt;
pub mod tenant;
pub mod usage_history;
pub mod user;

pub use api_key::ApiKeyRepository;
pub use content_generation::ContentGenerationRepository;
pub use page::PageRepository;
pub use platform_setting::PlatformSettingRepository;
pub use prompt::PromptRepository;
pub use tenant::TenantRepository;
pub use usage_history::UsageHistoryRepository;
pub use user::UserRepository;

pub const DEFAULT_PER_PAGE: u64 = 15;
pub const MAX_PER_PAGE: u64 = 100;

/// 1-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Paged<T> {
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Sort direction accepted by list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl From<SortDirection> for sea_orm::Order {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => sea_orm::Order::Asc,
            SortDirection::Desc => sea_orm::Order::Desc,
        }
    }
}

/// Trimmed, non-empty search term.
pub(crate) fn search_term(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps() {
        assert_eq!(Pagination::new(Some(0), Some(1000)), Pagination { page: 1, per_page: 100 });
        assert_eq!(Pagination::default(), Pagination { page: 1, per_page: 15 });
    }

    #[test]
    fn last_page_rounds_up() {
        let paged = Paged::<u8> { items: vec![], total: 31, page: 1, per_page: 15 };
        assert_eq!(paged.last_page(), 3);
        let empty = Paged::<u8> { items: vec![], total: 0, page: 1, per_page: 15 };
        assert_eq!(empty.last_page(), 1);
    }
}
