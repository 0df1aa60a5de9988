use super::*;
use sync_core::Visibility;

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = read_file(&dir.path().join("dashboard.toml")).expect("read");
    assert!(settings.is_none());
}

#[test]
fn file_values_fill_engine_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dashboard.toml");
    fs::write(
        &path,
        r#"
actor_id = "alice"
sync_timeout_ms = 250

[engine]
deployment_id = "acme"

[engine.store]
base_url = "http://127.0.0.1:8080"

[engine.orders]
name = "orders"
visibility = "private"
"#,
    )
    .expect("write");

    let settings = read_file(&path).expect("read").expect("present");
    assert_eq!(settings.actor_id.as_deref(), Some("alice"));
    assert_eq!(settings.sync_timeout_ms, 250);
    assert_eq!(settings.engine.deployment_id.as_deref(), Some("acme"));
    assert_eq!(
        settings.engine.store.base_url.as_deref(),
        Some("http://127.0.0.1:8080")
    );
    assert_eq!(settings.engine.orders.visibility, Visibility::Private);
    assert_eq!(settings.engine.integrations.name, "integrations");
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dashboard.toml");
    fs::write(&path, "sync_timeout_ms = \"soon\"").expect("write");

    assert!(matches!(read_file(&path), Err(ConfigError::Parse { .. })));
}

#[test]
fn env_overrides_file_values() {
    let mut settings = DashboardSettings {
        actor_id: Some("alice".into()),
        ..DashboardSettings::default()
    };
    apply_env(
        &mut settings,
        vars(&[
            ("DASHBOARD__STORE_URL", "https://orders.example.com"),
            ("DASHBOARD__DEPLOYMENT_ID", "prod"),
            ("DASHBOARD__ACTOR_ID", " "),
            ("DASHBOARD__FAIL_ON_MISSING_CONFIG", "true"),
            ("DASHBOARD__SYNC_TIMEOUT_MS", "100"),
            ("UNRELATED", "ignored"),
        ]),
    )
    .expect("env");

    assert_eq!(
        settings.engine.store.base_url.as_deref(),
        Some("https://orders.example.com")
    );
    assert_eq!(settings.engine.deployment_id.as_deref(), Some("prod"));
    assert_eq!(settings.actor_id, None);
    assert!(settings.engine.fail_on_missing_config);
    assert_eq!(settings.sync_timeout_ms, 100);
}

#[test]
fn unparsable_env_value_is_reported() {
    let mut settings = DashboardSettings::default();
    let err = apply_env(&mut settings, vars(&[("DASHBOARD__SYNC_TIMEOUT_MS", "later")]))
        .expect_err("invalid");
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DASHBOARD__SYNC_TIMEOUT_MS"));
}
