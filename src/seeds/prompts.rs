//! System prompt seeding
//!
//! System prompts belong to the `platform` tenant and are readable by every
//! tenant. Existing prompts are matched by name and left untouched.

use anyhow::Result;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::models::tenant::Model as TenantModel;
use crate::repositories::prompt::NewPrompt;
use crate::repositories::tenant::NewTenant;
use crate::repositories::{PromptRepository, TenantRepository};
use crate::templating::extract_placeholders;

pub const PLATFORM_SUBDOMAIN: &str = "platform";

struct SystemPrompt {
    name: &'static str,
    alias: &'static str,
    category: &'static str,
    description: &'static str,
    template: &'static str,
}

const SYSTEM_PROMPTS: &[SystemPrompt] = &[
    SystemPrompt {
        name: "SEO Blog Article",
        alias: "blog-article",
        category: "blog",
        description: "Long-form blog article optimised for a target keyword",
        template: "Write a blog article of about 800 words on: {{keyword}}. Include a catchy title, an introduction, 3-4 main sections with H2 subheadings and a conclusion with a call to action. Optimise for SEO with a natural keyword density.",
    },
    SystemPrompt {
        name: "Meta Title",
        alias: "meta-title",
        category: "meta_title",
        description: "Title tag options for a page",
        template: "Create 5 compelling page titles for: {{keyword}}. Each title must be at most 60 characters, include the main keyword, be clear and engaging, and be optimised for search engines.",
    },
    SystemPrompt {
        name: "Meta Description",
        alias: "meta-description",
        category: "meta_description",
        description: "Meta description for a page",
        template: "Write a meta description of at most 155 characters for a page about: {{keyword}}. It must be compelling, include the main keyword and end with a call to action that invites the click.",
    },
    SystemPrompt {
        name: "Content Outline",
        alias: "content-outline",
        category: "outline",
        description: "Structured outline to brief a writer",
        template: "Create a detailed content outline for an article about: {{keyword}}. Provide H2 and H3 headings, the key points for each section and suggested internal links.",
    },
];

/// Ensure the `platform` tenant exists and return it.
pub async fn seed_platform_tenant(db: &DatabaseConnection) -> Result<TenantModel> {
    let tenants = TenantRepository::new(db);
    if let Some(existing) = tenants.find_by_subdomain(PLATFORM_SUBDOMAIN).await? {
        log::info!("Platform tenant already exists, skipping");
        return Ok(existing);
    }

    log::info!("Creating platform tenant");
    let tenant = tenants
        .create(NewTenant {
            name: "Ainstein Platform".to_string(),
            domain: None,
            subdomain: Some(PLATFORM_SUBDOMAIN.to_string()),
            plan_type: "enterprise".to_string(),
            tokens_monthly_limit: 0,
            status: Some("active".to_string()),
            theme_config: None,
            brand_config: None,
            features: None,
        })
        .await?;
    Ok(tenant)
}

/// Create the default system prompts that are missing. Returns how many were created.
pub async fn seed_system_prompts(db: &DatabaseConnection, platform_tenant: Uuid) -> Result<usize> {
    let prompts = PromptRepository::new(db);
    let mut created = 0;

    for system in SYSTEM_PROMPTS {
        if prompts.find_system_by_name(system.name).await?.is_some() {
            log::info!("System prompt '{}' already exists, skipping", system.name);
            continue;
        }

        prompts
            .create(
                platform_tenant,
                NewPrompt {
                    name: system.name.to_string(),
                    alias: Some(system.alias.to_string()),
                    description: Some(system.description.to_string()),
                    template: system.template.to_string(),
                    variables: extract_placeholders(system.template),
                    category: Some(system.category.to_string()),
                    is_active: true,
                    is_system: true,
                },
            )
            .await?;
        log::info!("Created system prompt '{}'", system.name);
        created += 1;
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::seeds::run_seeds;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = test_connection().await;
        run_seeds(&db).await.unwrap();

        let tenant = seed_platform_tenant(&db).await.unwrap();
        assert_eq!(tenant.subdomain.as_deref(), Some(PLATFORM_SUBDOMAIN));
        assert_eq!(seed_system_prompts(&db, tenant.id).await.unwrap(), 0);

        let prompts = PromptRepository::new(&db);
        let meta = prompts
            .find_system_by_name("Meta Description")
            .await
            .unwrap()
            .unwrap();
        assert!(meta.is_system);
        assert_eq!(meta.prompt_type(), "meta_description");
        assert_eq!(meta.variable_names(), vec!["keyword".to_string()]);
    }
}
