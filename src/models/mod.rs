//! # Data Models
//!
//! SeaORM entities for the Ainstein platform plus small response types shared
//! by the HTTP layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod api_key;
pub mod content_generation;
pub mod page;
pub mod platform_setting;
pub mod prompt;
pub mod tenant;
pub mod usage_history;
pub mod user;

pub use api_key::Entity as ApiKey;
pub use content_generation::Entity as ContentGeneration;
pub use page::Entity as Page;
pub use platform_setting::Entity as PlatformSetting;
pub use prompt::Entity as Prompt;
pub use tenant::Entity as Tenant;
pub use usage_history::Entity as UsageHistory;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "ainstein".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
