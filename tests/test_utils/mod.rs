//! Test utilities shared by the integration suites.
//!
//! In-memory SQLite databases with migrations applied, fixture helpers and a
//! server harness bound to an ephemeral port.

use std::sync::Arc;

use ainstein::{
    ai::MockProvider,
    auth::hash_password,
    config::AppConfig,
    generation_executor::GenerationExecutor,
    models::{tenant, user},
    repositories::{
        TenantRepository, UserRepository,
        tenant::NewTenant,
        user::NewUser,
    },
    server::{AppState, build_state, create_app},
};
use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration accepted by `build_state` without touching the environment.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        crypto_key: Some(vec![42u8; 32]),
        jwt_secret: Some("integration-test-secret".to_string()),
        ..AppConfig::default()
    }
}

/// Application state whose AI calls go to the offline mock provider.
#[allow(dead_code)]
pub fn mock_state(db: DatabaseConnection) -> Result<AppState> {
    let mut state = build_state(test_config(), db)?;
    state.ai = state.ai.clone().with_provider(Arc::new(MockProvider));
    state.executor = GenerationExecutor::new(
        state.db.clone(),
        state.ai.clone(),
        state.notifier.clone(),
        state.config.worker.clone(),
    );
    Ok(state)
}

#[allow(dead_code)]
pub async fn create_test_tenant(db: &DatabaseConnection, name: &str) -> Result<tenant::Model> {
    let tenant = TenantRepository::new(db)
        .create(NewTenant {
            name: name.to_string(),
            domain: None,
            subdomain: None,
            plan_type: "pro".to_string(),
            tokens_monthly_limit: 100_000,
            status: None,
            theme_config: None,
            brand_config: None,
            features: None,
        })
        .await?;
    Ok(tenant)
}

#[allow(dead_code)]
pub async fn create_test_user(
    db: &DatabaseConnection,
    tenant_id: Option<Uuid>,
    email: &str,
    is_super_admin: bool,
) -> Result<user::Model> {
    let user = UserRepository::new(db)
        .create(NewUser {
            tenant_id,
            email: email.to_string(),
            password_hash: hash_password(TEST_PASSWORD)?,
            name: "Test User".to_string(),
            role: Some(user::ROLE_ADMIN.to_string()),
            is_super_admin,
            is_active: true,
            email_verified: true,
            preferences: None,
        })
        .await?;
    Ok(user)
}

/// Handle to a server spawned on an ephemeral port; shuts it down on drop.
#[allow(dead_code)]
pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

#[allow(dead_code)]
impl TestServerHandle {
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            handle.await.context("server task join failed")??;
        }
        Ok(())
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A running server plus the state it was built from.
#[allow(dead_code)]
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub client: reqwest::Client,
    pub handle: TestServerHandle,
}

#[allow(dead_code)]
impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    /// Bearer token for an existing user.
    pub async fn login(&self, email: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": TEST_PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(
            response.status().is_success(),
            "login failed with {}",
            response.status()
        );
        let body: serde_json::Value = response.json().await?;
        body["token"]
            .as_str()
            .map(str::to_string)
            .context("login response without token")
    }
}

/// Spawns the full router on 127.0.0.1 with a fresh database.
#[allow(dead_code)]
pub async fn spawn_test_app() -> Result<TestApp> {
    let db = setup_test_db().await?;
    let state = mock_state(db)?;
    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .context("axum server error")
    });

    Ok(TestApp {
        base_url: format!("http://{addr}"),
        state,
        client: reqwest::Client::new(),
        handle: TestServerHandle {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        },
    })
}
