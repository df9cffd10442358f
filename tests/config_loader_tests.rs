use ainstein::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const TEST_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        for (key, _) in env::vars() {
            if key.starts_with("AINSTEIN_") {
                env::remove_var(key);
            }
        }
    }
}

fn base_env() {
    unsafe {
        env::set_var("AINSTEIN_CRYPTO_KEY", TEST_KEY);
        env::set_var("AINSTEIN_JWT_SECRET", "local-dev-secret");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();
    base_env();

    let dir = TempDir::new().unwrap();
    let cfg = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_format, "json");
    assert_eq!(cfg.crypto_key.as_ref().map(Vec::len), Some(32));
    assert_eq!(cfg.worker.max_attempts, 3);
    assert_eq!(cfg.mail.transport, "log");
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "AINSTEIN_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &dir,
        ".env.local",
        &format!(
            "AINSTEIN_PROFILE=test\nAINSTEIN_API_BIND_ADDR=127.0.0.1:4000\n\
             AINSTEIN_CRYPTO_KEY={TEST_KEY}\nAINSTEIN_JWT_SECRET=layered-secret\n"
        ),
    );
    write_env_file(&dir, ".env.test", "AINSTEIN_API_BIND_ADDR=192.168.0.10:5000\n");
    write_env_file(
        &dir,
        ".env.test.local",
        "AINSTEIN_API_BIND_ADDR=10.0.0.5:6000\nAINSTEIN_WORKER_CONCURRENCY=2\n",
    );

    let cfg = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .expect("layered config loads");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.worker.concurrency, 2);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();
    base_env();

    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "AINSTEIN_API_BIND_ADDR=127.0.0.1:3000\n");
    unsafe {
        env::set_var("AINSTEIN_API_BIND_ADDR", "127.0.0.1:7777");
        env::set_var(
            "AINSTEIN_ADMIN_NOTIFICATION_EMAILS",
            "ops@ainstein.test, billing@ainstein.test",
        );
    }

    let cfg = ConfigLoader::with_base_dir(dir.path().to_path_buf())
        .load()
        .unwrap();
    assert_eq!(cfg.api_bind_addr, "127.0.0.1:7777");
    assert_eq!(
        cfg.mail.admin_notification_emails,
        vec!["ops@ainstein.test", "billing@ainstein.test"]
    );
    clear_env();
}

#[test]
fn missing_jwt_secret_is_rejected() {
    let _guard = env_guard();
    clear_env();
    unsafe {
        env::set_var("AINSTEIN_CRYPTO_KEY", TEST_KEY);
    }

    let dir = TempDir::new().unwrap();
    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(matches!(result, Err(ConfigError::MissingJwtSecret)));
    clear_env();
}

#[test]
fn short_jwt_secret_is_rejected_outside_development() {
    let _guard = env_guard();
    clear_env();
    base_env();
    unsafe {
        env::set_var("AINSTEIN_PROFILE", "prod");
    }

    let dir = TempDir::new().unwrap();
    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(matches!(result, Err(ConfigError::WeakJwtSecret { .. })));
    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();
    base_env();
    unsafe {
        env::set_var("AINSTEIN_API_BIND_ADDR", "not-an-address");
    }

    let dir = TempDir::new().unwrap();
    let result = ConfigLoader::with_base_dir(dir.path().to_path_buf()).load();
    assert!(matches!(result, Err(ConfigError::InvalidBindAddr { .. })));
    clear_env();
}
