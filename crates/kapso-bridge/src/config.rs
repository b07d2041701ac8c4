//! Bridge configuration
//!
//! Configuration is layered: built-in defaults, then the TOML config file,
//! then environment variables. Environment variables always win.
//!
//! Config file resolution: `KAPSO_CONFIG` env var →
//! `~/.config/kapso-whatsapp/config.toml` → defaults only.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Kapso API credentials
    pub kapso: KapsoConfig,
    /// Delivery source selection
    pub delivery: DeliveryConfig,
    /// Webhook receiver setup
    pub webhook: WebhookConfig,
    /// OpenClaw gateway connection
    pub gateway: GatewayConfig,
    /// State directory for the poll cursor
    pub state: StateConfig,
    /// Admission control
    pub security: SecurityConfig,
}

/// Kapso API credentials
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KapsoConfig {
    /// API key sent as `X-API-Key`
    pub api_key: String,
    /// WhatsApp phone number ID owned by the bot
    pub phone_number_id: String,
}

/// Delivery source selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// One of `polling`, `tailscale`, `domain`
    pub mode: String,
    /// Poll cadence in seconds (floor 5)
    pub poll_interval: u64,
    /// Run the poller alongside a webhook mode
    pub poll_fallback: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: "polling".to_string(),
            poll_interval: 30,
            poll_fallback: false,
        }
    }
}

/// Webhook receiver setup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Bind address, e.g. `0.0.0.0:18790`
    pub addr: String,
    /// Meta webhook verification token
    pub verify_token: String,
    /// HMAC app secret for `X-Hub-Signature-256` (empty = no validation)
    pub secret: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:18790".to_string(),
            verify_token: String::new(),
            secret: String::new(),
        }
    }
}

/// OpenClaw gateway connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket URL of the gateway
    pub url: String,
    /// Gateway auth token
    pub token: String,
    /// Base agent session key
    pub session_key: String,
    /// Path to the agent's sessions.json index
    pub sessions_json: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let sessions = home_join(&[".openclaw", "agents", "main", "sessions", "sessions.json"]);
        Self {
            url: "ws://127.0.0.1:18789".to_string(),
            token: String::new(),
            session_key: "main".to_string(),
            sessions_json: sessions,
        }
    }
}

/// State directory for the poll cursor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding the `last-poll` cursor file
    pub dir: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: home_join(&[".config", "kapso-whatsapp"]),
        }
    }
}

/// Admission control configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// `allowlist` (default-deny) or `open` (default-allow)
    pub mode: String,
    /// Role name → phone numbers granted that role
    pub roles: BTreeMap<String, Vec<String>>,
    /// Reply sent once to denied senders (empty = silent)
    pub deny_message: String,
    /// Messages allowed per sender per window (floor 1)
    pub rate_limit: u32,
    /// Rate window in seconds (floor 10)
    pub rate_window: u64,
    /// Derive a per-sender gateway session key
    pub session_isolation: bool,
    /// Role assigned to senders outside the roles map
    pub default_role: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mode: "allowlist".to_string(),
            roles: BTreeMap::new(),
            deny_message: "Sorry, you are not authorized to use this service.".to_string(),
            rate_limit: 10,
            rate_window: 60,
            session_isolation: true,
            default_role: "member".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the TOML config file (if it exists) and apply
    /// environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path() {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                config = toml::from_str(&raw).map_err(|e| {
                    Error::Config(format!("failed to parse {}: {e}", path.display()))
                })?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Normalize and bound-check the configuration.
    ///
    /// Invalid values are replaced with defaults rather than rejected; the
    /// only hard startup failures are missing credentials, which the caller
    /// checks after load.
    pub fn validate(&mut self) {
        if self.delivery.poll_interval < 5 {
            self.delivery.poll_interval = 30;
        }

        self.delivery.mode = match self.delivery.mode.to_lowercase().as_str() {
            m @ ("polling" | "tailscale" | "domain") => m.to_string(),
            _ => "polling".to_string(),
        };

        match self.security.mode.as_str() {
            "allowlist" | "open" => {}
            _ => self.security.mode = "allowlist".to_string(),
        }

        if self.security.rate_limit < 1 {
            self.security.rate_limit = 1;
        }
        if self.security.rate_window < 10 {
            self.security.rate_window = 10;
        }

        // A bare `:port` bind address is accepted for convenience.
        if self.webhook.addr.starts_with(':') {
            self.webhook.addr = format!("0.0.0.0{}", self.webhook.addr);
        }

        if self.security.mode == "allowlist" {
            let total: usize = self.security.roles.values().map(Vec::len).sum();
            if total == 0 {
                warn!(
                    "security mode is \"allowlist\" but no numbers are configured — \
                     all messages will be rejected"
                );
            }
        }

        // Duplicate numbers across roles: first role (alphabetical) wins.
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (role, numbers) in &self.security.roles {
            for phone in numbers {
                if let Some(previous) = seen.get(phone.as_str()) {
                    warn!(
                        phone = %phone,
                        first = %previous,
                        duplicate = %role,
                        "phone appears in two roles — the first one wins"
                    );
                } else {
                    seen.insert(phone, role);
                }
            }
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("KAPSO_API_KEY") {
            self.kapso.api_key = v;
        }
        if let Ok(v) = std::env::var("KAPSO_PHONE_NUMBER_ID") {
            self.kapso.phone_number_id = v;
        }

        if let Ok(v) = std::env::var("KAPSO_MODE") {
            self.delivery.mode = resolve_mode(&v, "");
        } else if let Ok(v) = std::env::var("KAPSO_WEBHOOK_MODE") {
            self.delivery.mode = resolve_mode("", &v);
        }
        if let Ok(v) = std::env::var("KAPSO_POLL_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.delivery.poll_interval = n;
            }
        }
        if let Ok(v) = std::env::var("KAPSO_POLL_FALLBACK") {
            self.delivery.poll_fallback = v == "true";
        }

        if let Ok(v) = std::env::var("KAPSO_WEBHOOK_ADDR") {
            self.webhook.addr = v;
        }
        if let Ok(v) = std::env::var("KAPSO_WEBHOOK_VERIFY_TOKEN") {
            self.webhook.verify_token = v;
        }
        if let Ok(v) = std::env::var("KAPSO_WEBHOOK_SECRET") {
            self.webhook.secret = v;
        }

        if let Ok(v) = std::env::var("OPENCLAW_GATEWAY_URL") {
            self.gateway.url = v;
        }
        if let Ok(v) = std::env::var("OPENCLAW_TOKEN") {
            self.gateway.token = v;
        }
        if let Ok(v) = std::env::var("OPENCLAW_SESSION_KEY") {
            self.gateway.session_key = v;
        }
        if let Ok(v) = std::env::var("OPENCLAW_SESSIONS_JSON") {
            self.gateway.sessions_json = v;
        }

        if let Ok(v) = std::env::var("KAPSO_STATE_DIR") {
            self.state.dir = v;
        }

        if let Ok(v) = std::env::var("KAPSO_SECURITY_MODE") {
            self.security.mode = v;
        }
        if let Ok(v) = std::env::var("KAPSO_DENY_MESSAGE") {
            self.security.deny_message = v;
        }
        if let Ok(v) = std::env::var("KAPSO_RATE_LIMIT") {
            if let Ok(n) = v.parse() {
                self.security.rate_limit = n;
            }
        }
        if let Ok(v) = std::env::var("KAPSO_RATE_WINDOW") {
            if let Ok(n) = v.parse() {
                self.security.rate_window = n;
            }
        }
        if let Ok(v) = std::env::var("KAPSO_SESSION_ISOLATION") {
            self.security.session_isolation = v == "true";
        }
        if let Ok(v) = std::env::var("KAPSO_DEFAULT_ROLE") {
            self.security.default_role = v;
        }
        if let Ok(v) = std::env::var("KAPSO_ALLOWED_NUMBERS") {
            // Convenience: comma-separated numbers all get the default role.
            let role = self.security.default_role.clone();
            for number in v.split(',') {
                let number = number.trim();
                if number.is_empty() {
                    continue;
                }
                if !phone_in_roles(&self.security.roles, number) {
                    self.security
                        .roles
                        .entry(role.clone())
                        .or_default()
                        .push(number.to_string());
                }
            }
        }
    }
}

/// Normalise the delivery mode from `KAPSO_MODE` (preferred) or the
/// deprecated `KAPSO_WEBHOOK_MODE`.
fn resolve_mode(mode: &str, legacy_mode: &str) -> String {
    match mode.to_lowercase().as_str() {
        m @ ("polling" | "tailscale" | "domain") => return m.to_string(),
        _ => {}
    }

    match legacy_mode.to_lowercase().as_str() {
        "webhook" | "both" => return "domain".to_string(),
        _ => {}
    }

    "polling".to_string()
}

fn phone_in_roles(roles: &BTreeMap<String, Vec<String>>, phone: &str) -> bool {
    roles.values().any(|numbers| numbers.iter().any(|n| n == phone))
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KAPSO_CONFIG") {
        return Some(expand_home(&path));
    }
    dirs::home_dir().map(|home| home.join(".config").join("kapso-whatsapp").join("config.toml"))
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_join(parts: &[&str]) -> String {
    let mut path = dirs::home_dir().unwrap_or_default();
    for part in parts {
        path = path.join(part);
    }
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests;
