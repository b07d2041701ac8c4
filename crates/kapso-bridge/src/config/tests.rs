use super::*;
use std::sync::Mutex;

// Environment variables are process-global; serialize the tests that touch them.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_bridge_env() {
    for key in [
        "KAPSO_CONFIG",
        "KAPSO_API_KEY",
        "KAPSO_PHONE_NUMBER_ID",
        "KAPSO_MODE",
        "KAPSO_WEBHOOK_MODE",
        "KAPSO_POLL_INTERVAL",
        "KAPSO_POLL_FALLBACK",
        "KAPSO_WEBHOOK_ADDR",
        "KAPSO_WEBHOOK_VERIFY_TOKEN",
        "KAPSO_WEBHOOK_SECRET",
        "OPENCLAW_GATEWAY_URL",
        "OPENCLAW_TOKEN",
        "OPENCLAW_SESSION_KEY",
        "OPENCLAW_SESSIONS_JSON",
        "KAPSO_STATE_DIR",
        "KAPSO_SECURITY_MODE",
        "KAPSO_DENY_MESSAGE",
        "KAPSO_RATE_LIMIT",
        "KAPSO_RATE_WINDOW",
        "KAPSO_SESSION_ISOLATION",
        "KAPSO_DEFAULT_ROLE",
        "KAPSO_ALLOWED_NUMBERS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_are_sensible() {
    let config = Config::default();

    assert_eq!(config.delivery.mode, "polling");
    assert_eq!(config.delivery.poll_interval, 30);
    assert_eq!(config.gateway.url, "ws://127.0.0.1:18789");
    assert_eq!(config.gateway.session_key, "main");
    assert_eq!(config.security.mode, "allowlist");
    assert_eq!(config.security.rate_limit, 10);
    assert_eq!(config.security.rate_window, 60);
    assert!(config.security.session_isolation);
    assert_eq!(config.security.default_role, "member");
}

#[test]
fn toml_file_overrides_defaults() {
    let raw = r#"
        [kapso]
        api_key = "key"
        phone_number_id = "12345"

        [delivery]
        mode = "tailscale"
        poll_interval = 60

        [security]
        rate_limit = 3

        [security.roles]
        admin = ["+15550001111"]
    "#;

    let config: Config = toml::from_str(raw).unwrap();

    assert_eq!(config.kapso.api_key, "key");
    assert_eq!(config.delivery.mode, "tailscale");
    assert_eq!(config.delivery.poll_interval, 60);
    assert_eq!(config.security.rate_limit, 3);
    assert_eq!(config.security.roles["admin"], vec!["+15550001111"]);
    // Untouched sections keep their defaults.
    assert_eq!(config.webhook.addr, "0.0.0.0:18790");
}

#[test]
fn validate_applies_floors_and_mode_fallback() {
    let mut config = Config::default();
    config.delivery.poll_interval = 1;
    config.delivery.mode = "carrier-pigeon".to_string();
    config.security.mode = "whatever".to_string();
    config.security.rate_limit = 0;
    config.security.rate_window = 2;

    config.validate();

    assert_eq!(config.delivery.poll_interval, 30);
    assert_eq!(config.delivery.mode, "polling");
    assert_eq!(config.security.mode, "allowlist");
    assert_eq!(config.security.rate_limit, 1);
    assert_eq!(config.security.rate_window, 10);
}

#[test]
fn validate_expands_bare_port_addr() {
    let mut config = Config::default();
    config.webhook.addr = ":18790".to_string();

    config.validate();

    assert_eq!(config.webhook.addr, "0.0.0.0:18790");
}

#[test]
fn resolve_mode_prefers_primary_and_maps_legacy() {
    assert_eq!(resolve_mode("TAILSCALE", ""), "tailscale");
    assert_eq!(resolve_mode("domain", "webhook"), "domain");
    assert_eq!(resolve_mode("", "webhook"), "domain");
    assert_eq!(resolve_mode("", "both"), "domain");
    assert_eq!(resolve_mode("", ""), "polling");
    assert_eq!(resolve_mode("bogus", "bogus"), "polling");
}

#[test]
fn env_overrides_win() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_bridge_env();

    std::env::set_var("KAPSO_API_KEY", "env-key");
    std::env::set_var("KAPSO_MODE", "domain");
    std::env::set_var("KAPSO_POLL_INTERVAL", "45");
    std::env::set_var("OPENCLAW_SESSION_KEY", "work");
    std::env::set_var("KAPSO_SESSION_ISOLATION", "false");

    let mut config = Config::default();
    config.kapso.api_key = "file-key".to_string();
    config.apply_env();

    assert_eq!(config.kapso.api_key, "env-key");
    assert_eq!(config.delivery.mode, "domain");
    assert_eq!(config.delivery.poll_interval, 45);
    assert_eq!(config.gateway.session_key, "work");
    assert!(!config.security.session_isolation);

    clear_bridge_env();
}

#[test]
fn allowed_numbers_env_assigns_default_role() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_bridge_env();

    std::env::set_var("KAPSO_ALLOWED_NUMBERS", "+111, +222 ,,+333");

    let mut config = Config::default();
    config
        .security
        .roles
        .insert("admin".to_string(), vec!["+222".to_string()]);
    config.apply_env();

    // +222 is already present under admin and must not be duplicated.
    assert_eq!(config.security.roles["admin"], vec!["+222"]);
    assert_eq!(config.security.roles["member"], vec!["+111", "+333"]);

    clear_bridge_env();
}
