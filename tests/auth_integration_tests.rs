//! Integration tests for authentication, API keys and tenant access rules

use ainstein::repositories::{TenantRepository, UserRepository};
use ainstein::repositories::{tenant::TenantChanges, user::UserChanges};
use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{create_test_tenant, create_test_user, spawn_test_app};

#[tokio::test]
async fn register_issues_token_for_new_tenant_admin() -> Result<()> {
    let app = spawn_test_app().await?;

    let response = app
        .client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "name": "Grace Hopper",
            "email": "grace@navy.test",
            "password": "compiler-2024",
            "password_confirmation": "compiler-2024",
            "company_name": "Navy Labs",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await?;
    assert_eq!(body["user"]["role"], "tenant_admin");
    assert_eq!(body["tenant"]["plan_type"], "starter");
    assert_eq!(body["tenant"]["subdomain"], "navy-labs");

    let token = body["token"].as_str().unwrap();
    let me: Value = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .bearer_auth(token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(me["user"]["email"], "grace@navy.test");
    assert_eq!(me["tenant"]["name"], "Navy Labs");

    app.handle.shutdown().await
}

#[tokio::test]
async fn registration_mismatched_password_is_rejected() -> Result<()> {
    let app = spawn_test_app().await?;

    let response = app
        .client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "name": "Grace Hopper",
            "email": "grace@navy.test",
            "password": "compiler-2024",
            "password_confirmation": "compiler-2025",
            "company_name": "Navy Labs",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert!(body["details"]["password"].is_string());

    app.handle.shutdown().await
}

#[tokio::test]
async fn inactive_user_cannot_log_in() -> Result<()> {
    let app = spawn_test_app().await?;
    let tenant = create_test_tenant(app.db(), "Acme").await?;
    let user = create_test_user(app.db(), Some(tenant.id), "ada@acme.test", false).await?;

    UserRepository::new(app.db())
        .update(
            user.id,
            UserChanges {
                is_active: Some(false),
                ..UserChanges::default()
            },
        )
        .await?;

    let response = app
        .client
        .post(app.url("/api/v1/auth/login"))
        .json(&json!({ "email": "ada@acme.test", "password": test_utils::TEST_PASSWORD }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Account is inactive");

    app.handle.shutdown().await
}

#[tokio::test]
async fn suspended_tenant_blocks_tenant_routes() -> Result<()> {
    let app = spawn_test_app().await?;
    let tenant = create_test_tenant(app.db(), "Acme").await?;
    create_test_user(app.db(), Some(tenant.id), "ada@acme.test", false).await?;
    let token = app.login("ada@acme.test").await?;

    TenantRepository::new(app.db())
        .update(
            tenant.id,
            TenantChanges {
                status: Some("suspended".to_string()),
                ..TenantChanges::default()
            },
        )
        .await?;

    let response = app
        .client
        .get(app.url("/api/v1/pages"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await?;
    assert_eq!(body["details"]["tenant_status"], "suspended");

    let me = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(me.status(), StatusCode::OK);

    app.handle.shutdown().await
}

#[tokio::test]
async fn tampered_and_garbage_tokens_are_rejected() -> Result<()> {
    let app = spawn_test_app().await?;
    let tenant = create_test_tenant(app.db(), "Acme").await?;
    create_test_user(app.db(), Some(tenant.id), "ada@acme.test", false).await?;
    let token = app.login("ada@acme.test").await?;

    let mut tampered = token.clone();
    tampered.pop();
    tampered.push(if token.ends_with('A') { 'B' } else { 'A' });

    for bad in [tampered.as_str(), "not-a-jwt", "ak_doesnotexist"] {
        let response = app
            .client
            .get(app.url("/api/v1/auth/me"))
            .bearer_auth(bad)
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{bad}");
    }

    let response = app
        .client
        .get(app.url("/api/v1/auth/me"))
        .header("Authorization", format!("Token {token}"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.handle.shutdown().await
}

#[tokio::test]
async fn api_key_limit_follows_plan() -> Result<()> {
    let app = spawn_test_app().await?;
    let register: Value = app
        .client
        .post(app.url("/api/v1/auth/register"))
        .json(&json!({
            "name": "Owner",
            "email": "owner@starter.test",
            "password": "starter-pass",
            "password_confirmation": "starter-pass",
            "company_name": "Starter Co",
        }))
        .send()
        .await?
        .json()
        .await?;
    let token = register["token"].as_str().unwrap().to_string();

    for i in 0..5 {
        let response = app
            .client
            .post(app.url("/api/v1/api-keys"))
            .bearer_auth(&token)
            .json(&json!({ "name": format!("key {i}") }))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .client
        .post(app.url("/api/v1/api-keys"))
        .bearer_auth(&token)
        .json(&json!({ "name": "one too many" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let list: Value = app
        .client
        .get(app.url("/api/v1/api-keys"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(list["data"].as_array().unwrap().len(), 5);
    assert!(list["data"][0].get("key_hash").is_none());

    app.handle.shutdown().await
}

#[tokio::test]
async fn expired_api_key_cannot_be_created() -> Result<()> {
    let app = spawn_test_app().await?;
    let tenant = create_test_tenant(app.db(), "Acme").await?;
    create_test_user(app.db(), Some(tenant.id), "ada@acme.test", false).await?;
    let token = app.login("ada@acme.test").await?;

    let response = app
        .client
        .post(app.url("/api/v1/api-keys"))
        .bearer_auth(&token)
        .json(&json!({ "name": "stale", "expires_at": "2001-01-01T00:00:00Z" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await?;
    assert!(body["details"]["expires_at"].is_string());

    app.handle.shutdown().await
}
