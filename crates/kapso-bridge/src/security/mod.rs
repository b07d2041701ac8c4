//! Admission control
//!
//! The [`Guard`] enforces the sender allowlist, per-sender fixed-window rate
//! limiting, role resolution, and per-sender session key derivation. One
//! canonical phone form is used for every lookup.

use crate::config::SecurityConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

#[cfg(test)]
mod tests;

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the message to the gateway
    Allow,
    /// Sender is not on the allowlist
    Deny,
    /// Sender exhausted the rate window
    RateLimited,
}

/// Rate limit state for a single sender.
struct Bucket {
    tokens: u32,
    window_end: Instant,
}

/// Sender admission guard.
pub struct Guard {
    mode: String,
    phone_roles: HashMap<String, String>,
    default_role: String,
    deny_message: String,
    rate_limit: u32,
    rate_window: Duration,
    isolate: bool,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl Guard {
    /// Build a guard from the security config, inverting the role→phones map
    /// into a normalized phone→role lookup. When a phone appears under two
    /// roles, the first one (alphabetical role order) wins; config
    /// validation surfaces the conflict.
    #[must_use]
    pub fn new(config: &SecurityConfig) -> Self {
        let mut phone_roles = HashMap::new();
        for (role, numbers) in &config.roles {
            for phone in numbers {
                let normalized = normalize(phone);
                phone_roles.entry(normalized).or_insert_with(|| role.clone());
            }
        }

        Self {
            mode: config.mode.clone(),
            phone_roles,
            default_role: config.default_role.clone(),
            deny_message: config.deny_message.clone(),
            rate_limit: config.rate_limit,
            rate_window: Duration::from_secs(config.rate_window),
            isolate: config.session_isolation,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check a sender: allowlist first, then the rate bucket.
    pub async fn check(&self, from: &str) -> Verdict {
        self.check_at(from, Instant::now()).await
    }

    async fn check_at(&self, from: &str, now: Instant) -> Verdict {
        let normalized = normalize(from);

        if self.mode == "allowlist" && !self.phone_roles.contains_key(&normalized) {
            return Verdict::Deny;
        }

        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(&normalized) {
            Some(bucket) if now < bucket.window_end => {
                if bucket.tokens == 0 {
                    return Verdict::RateLimited;
                }
                bucket.tokens -= 1;
                Verdict::Allow
            }
            _ => {
                // First message, or the window expired: open a fresh window
                // and spend one token.
                if self.rate_limit == 0 {
                    warn!(from = %normalized, "rate limit of zero blocks everything");
                    return Verdict::RateLimited;
                }
                buckets.insert(
                    normalized,
                    Bucket {
                        tokens: self.rate_limit - 1,
                        window_end: now + self.rate_window,
                    },
                );
                Verdict::Allow
            }
        }
    }

    /// Resolve the sender's role: the mapped role if present, otherwise the
    /// configured default.
    #[must_use]
    pub fn role(&self, from: &str) -> String {
        let normalized = normalize(from);
        self.phone_roles
            .get(&normalized)
            .cloned()
            .unwrap_or_else(|| self.default_role.clone())
    }

    /// The configured denial message (empty = stay silent).
    #[must_use]
    pub fn deny_message(&self) -> &str {
        &self.deny_message
    }

    /// Derive the gateway session key for a sender. With isolation off this
    /// is the base key unchanged.
    #[must_use]
    pub fn session_key(&self, base: &str, from: &str) -> String {
        if !self.isolate {
            return base.to_string();
        }
        let normalized = normalize(from);
        let suffix = normalized.trim_start_matches('+');
        format!("{base}-wa-{suffix}")
    }
}

/// Canonicalize a phone number: keep a leading `+` and all digits, drop
/// everything else.
#[must_use]
pub fn normalize(phone: &str) -> String {
    let mut out = String::with_capacity(phone.len());
    for (i, c) in phone.chars().enumerate() {
        if (c == '+' && i == 0) || c.is_ascii_digit() {
            out.push(c);
        }
    }
    out
}
