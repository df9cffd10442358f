//! Tenant isolation across pages, prompts, generations and tenant records

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{TestApp, create_test_tenant, create_test_user, spawn_test_app};

struct Fixture {
    acme_token: String,
    globex_token: String,
    admin_token: String,
    acme_tenant: String,
    page_id: String,
    prompt_id: String,
}

async fn fixture(app: &TestApp) -> Result<Fixture> {
    let acme = create_test_tenant(app.db(), "Acme").await?;
    let globex = create_test_tenant(app.db(), "Globex").await?;
    create_test_user(app.db(), Some(acme.id), "ada@acme.test", false).await?;
    create_test_user(app.db(), Some(globex.id), "hank@globex.test", false).await?;
    create_test_user(app.db(), None, "root@ainstein.test", true).await?;

    let acme_token = app.login("ada@acme.test").await?;
    let page: Value = app
        .client
        .post(app.url("/api/v1/pages"))
        .bearer_auth(&acme_token)
        .json(&json!({ "url_path": "/blog/secret", "keyword": "acme roadmap" }))
        .send()
        .await?
        .json()
        .await?;
    let prompt: Value = app
        .client
        .post(app.url("/api/v1/prompts"))
        .bearer_auth(&acme_token)
        .json(&json!({ "name": "Acme voice", "template": "Write about {{keyword}}" }))
        .send()
        .await?
        .json()
        .await?;

    Ok(Fixture {
        globex_token: app.login("hank@globex.test").await?,
        admin_token: app.login("root@ainstein.test").await?,
        acme_token,
        acme_tenant: acme.id.to_string(),
        page_id: page["data"]["id"].as_str().unwrap().to_string(),
        prompt_id: prompt["data"]["id"].as_str().unwrap().to_string(),
    })
}

async fn status_of(app: &TestApp, method: reqwest::Method, path: &str, token: &str) -> Result<StatusCode> {
    let mut request = app.client.request(method.clone(), app.url(path)).bearer_auth(token);
    if method == reqwest::Method::PUT {
        request = request.json(&json!({ "keyword": "hijacked" }));
    }
    Ok(request.send().await?.status())
}

#[tokio::test]
async fn foreign_pages_are_forbidden() -> Result<()> {
    let app = spawn_test_app().await?;
    let fx = fixture(&app).await?;
    let path = format!("/api/v1/pages/{}", fx.page_id);

    for method in [reqwest::Method::GET, reqwest::Method::PUT, reqwest::Method::DELETE] {
        let status = status_of(&app, method.clone(), &path, &fx.globex_token).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method}");
    }

    let status = status_of(&app, reqwest::Method::GET, &path, &fx.acme_token).await?;
    assert_eq!(status, StatusCode::OK);

    app.handle.shutdown().await
}

#[tokio::test]
async fn foreign_prompts_are_forbidden_and_unlisted() -> Result<()> {
    let app = spawn_test_app().await?;
    let fx = fixture(&app).await?;

    let status = status_of(
        &app,
        reqwest::Method::GET,
        &format!("/api/v1/prompts/{}", fx.prompt_id),
        &fx.globex_token,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let list: Value = app
        .client
        .get(app.url("/api/v1/prompts"))
        .bearer_auth(&fx.globex_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(list["meta"]["total"], 0);

    app.handle.shutdown().await
}

#[tokio::test]
async fn generation_requires_page_in_own_tenant() -> Result<()> {
    let app = spawn_test_app().await?;
    let fx = fixture(&app).await?;

    let globex_prompt: Value = app
        .client
        .post(app.url("/api/v1/prompts"))
        .bearer_auth(&fx.globex_token)
        .json(&json!({ "name": "Globex voice", "template": "Write about {{keyword}}" }))
        .send()
        .await?
        .json()
        .await?;

    let response = app
        .client
        .post(app.url("/api/v1/generations"))
        .bearer_auth(&fx.globex_token)
        .json(&json!({
            "page_id": fx.page_id,
            "prompt_id": globex_prompt["data"]["id"],
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .client
        .post(app.url("/api/v1/generations"))
        .bearer_auth(&fx.globex_token)
        .json(&json!({ "page_id": fx.page_id, "prompt_id": fx.prompt_id }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.handle.shutdown().await
}

#[tokio::test]
async fn tenant_records_are_visible_to_members_and_super_admins_only() -> Result<()> {
    let app = spawn_test_app().await?;
    let fx = fixture(&app).await?;
    let path = format!("/api/v1/tenants/{}", fx.acme_tenant);

    assert_eq!(
        status_of(&app, reqwest::Method::GET, &path, &fx.globex_token).await?,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        status_of(&app, reqwest::Method::GET, &path, &fx.acme_token).await?,
        StatusCode::OK
    );
    assert_eq!(
        status_of(&app, reqwest::Method::GET, &path, &fx.admin_token).await?,
        StatusCode::OK
    );

    let own: Value = app
        .client
        .get(app.url("/api/v1/tenants"))
        .bearer_auth(&fx.globex_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(own["meta"]["total"], 1);
    assert_eq!(own["data"][0]["name"], "Globex");

    let all: Value = app
        .client
        .get(app.url("/api/v1/tenants"))
        .bearer_auth(&fx.admin_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(all["meta"]["total"], 2);

    let response = app
        .client
        .post(app.url("/api/v1/tenants"))
        .bearer_auth(&fx.acme_token)
        .json(&json!({ "name": "Rogue", "plan_type": "pro", "tokens_monthly_limit": 1 }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.handle.shutdown().await
}

#[tokio::test]
async fn super_admin_lists_users_across_tenants() -> Result<()> {
    let app = spawn_test_app().await?;
    let fx = fixture(&app).await?;

    let all: Value = app
        .client
        .get(app.url("/api/v1/admin/users"))
        .bearer_auth(&fx.admin_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(all["meta"]["total"], 3);

    let scoped: Value = app
        .client
        .get(app.url(&format!("/api/v1/admin/users?tenant_id={}", fx.acme_tenant)))
        .bearer_auth(&fx.admin_token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(scoped["meta"]["total"], 1);
    assert_eq!(scoped["data"][0]["email"], "ada@acme.test");

    app.handle.shutdown().await
}
