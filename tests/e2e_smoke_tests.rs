//! Boots the real `ainstein` binary against a throwaway SQLite file and
//! walks the public surface plus one authenticated tenant flow.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use portpicker::pick_unused_port;
use rand::Rng;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tempfile::TempDir;

const READY_TIMEOUT: Duration = Duration::from_secs(60);
const MIN_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 500;

const CRYPTO_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

/// Kills the server when the test ends, including on panic.
struct ServerProcess(Child);

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn binary_starts_and_serves_core_endpoints() {
    let dir = TempDir::new().expect("tempdir");
    let db_url = format!("sqlite://{}/smoke.db?mode=rwc", dir.path().display());
    let port = pick_unused_port().expect("no free port for smoke test");
    let bind_addr = format!("127.0.0.1:{port}");
    let base_url = format!("http://{bind_addr}");

    let mut server = ServerProcess(spawn_server(&dir, &bind_addr, &db_url));
    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("http client");

    if let Err(err) = wait_for_ready(&client, &base_url) {
        let exited = server.0.try_wait().ok().flatten();
        panic!("server never became ready: {err} (exit status: {exited:?})");
    }

    for path in ["/", "/healthz", "/readyz", "/openapi.json"] {
        let response = client
            .get(format!("{base_url}{path}"))
            .send()
            .unwrap_or_else(|e| panic!("GET {path} failed: {e}"));
        assert!(response.status().is_success(), "GET {path} -> {}", response.status());
    }

    let public: Value = client
        .get(format!("{base_url}/api/v1/settings/public"))
        .send()
        .and_then(|r| r.json())
        .expect("public settings");
    assert_eq!(public["maintenance_mode"], false);

    let registered = client
        .post(format!("{base_url}/api/v1/auth/register"))
        .json(&json!({
            "name": "Smoke Tester",
            "email": "smoke@ainstein.test",
            "password": "smoke-test-pass",
            "password_confirmation": "smoke-test-pass",
            "company_name": "Smoke Co",
        }))
        .send()
        .expect("register");
    assert_eq!(registered.status(), reqwest::StatusCode::CREATED);
    let body: Value = registered.json().expect("register body");
    let token = body["token"].as_str().expect("token").to_string();

    let page = client
        .post(format!("{base_url}/api/v1/pages"))
        .bearer_auth(&token)
        .json(&json!({ "url_path": "/smoke", "keyword": "smoke testing" }))
        .send()
        .expect("create page");
    assert_eq!(page.status(), reqwest::StatusCode::CREATED);

    let prompts: Value = client
        .get(format!("{base_url}/api/v1/prompts?include_system=true"))
        .bearer_auth(&token)
        .send()
        .and_then(|r| r.json())
        .expect("list prompts");
    assert!(
        prompts["meta"]["total"].as_u64().unwrap_or_default() >= 4,
        "seeded system prompts are listed: {prompts}"
    );
}

fn spawn_server(dir: &TempDir, bind_addr: &str, db_url: &str) -> Child {
    let bin_path = assert_cmd::cargo::cargo_bin!("ainstein");
    Command::new(bin_path)
        .current_dir(dir.path())
        .env("AINSTEIN_PROFILE", "test")
        .env("AINSTEIN_API_BIND_ADDR", bind_addr)
        .env("AINSTEIN_DATABASE_URL", db_url)
        .env("AINSTEIN_CRYPTO_KEY", CRYPTO_KEY)
        .env("AINSTEIN_JWT_SECRET", "smoke-test-secret")
        .env("AINSTEIN_WORKER_TICK_MS", "250")
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn ainstein binary")
}

fn wait_for_ready(client: &Client, base_url: &str) -> Result<(), String> {
    let ready_url = format!("{base_url}/readyz");
    let start = Instant::now();
    let mut last_error = String::from("no attempts yet");

    while start.elapsed() < READY_TIMEOUT {
        match client.get(&ready_url).send() {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => last_error = format!("/readyz returned {}", resp.status()),
            Err(e) => last_error = format!("request error: {e}"),
        }
        let backoff = rand::thread_rng().gen_range(MIN_BACKOFF_MS..=MAX_BACKOFF_MS);
        thread::sleep(Duration::from_millis(backoff));
    }

    Err(format!("timed out after {READY_TIMEOUT:?}; last error: {last_error}"))
}
