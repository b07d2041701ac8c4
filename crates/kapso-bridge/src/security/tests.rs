use super::*;
use crate::config::SecurityConfig;

fn config(mode: &str, rate_limit: u32, rate_window: u64) -> SecurityConfig {
    let mut config = SecurityConfig {
        mode: mode.to_string(),
        rate_limit,
        rate_window,
        ..SecurityConfig::default()
    };
    config
        .roles
        .insert("admin".to_string(), vec!["+1 (555) 000-1111".to_string()]);
    config
        .roles
        .insert("member".to_string(), vec!["+15550002222".to_string()]);
    config
}

#[tokio::test]
async fn allowlist_denies_unknown_senders() {
    let guard = Guard::new(&config("allowlist", 10, 60));

    assert_eq!(guard.check("+15559999999").await, Verdict::Deny);
    assert_eq!(guard.check("+15550001111").await, Verdict::Allow);
}

#[tokio::test]
async fn open_mode_allows_unknown_senders() {
    let guard = Guard::new(&config("open", 10, 60));

    assert_eq!(guard.check("+15559999999").await, Verdict::Allow);
}

#[tokio::test]
async fn rate_limit_verdict_sequence() {
    let guard = Guard::new(&config("open", 2, 60));
    let start = Instant::now();

    assert_eq!(guard.check_at("+1", start).await, Verdict::Allow);
    assert_eq!(
        guard.check_at("+1", start + Duration::from_secs(5)).await,
        Verdict::Allow
    );
    assert_eq!(
        guard.check_at("+1", start + Duration::from_secs(10)).await,
        Verdict::RateLimited
    );
    // A fresh window opens once the previous one has elapsed.
    assert_eq!(
        guard.check_at("+1", start + Duration::from_secs(70)).await,
        Verdict::Allow
    );
}

#[tokio::test]
async fn rate_limited_sender_does_not_affect_others() {
    let guard = Guard::new(&config("open", 1, 60));
    let start = Instant::now();

    assert_eq!(guard.check_at("+1", start).await, Verdict::Allow);
    assert_eq!(guard.check_at("+1", start).await, Verdict::RateLimited);
    assert_eq!(guard.check_at("+2", start).await, Verdict::Allow);
}

#[tokio::test]
async fn allow_count_never_exceeds_limit_within_window() {
    let limit = 4u32;
    let guard = Guard::new(&config("open", limit, 60));
    let start = Instant::now();

    let mut allowed = 0;
    for i in 0..20u64 {
        let at = start + Duration::from_secs(i);
        if guard.check_at("+1", at).await == Verdict::Allow {
            allowed += 1;
        }
    }
    assert_eq!(allowed, limit);
}

#[test]
fn raw_and_formatted_numbers_share_a_role() {
    let guard = Guard::new(&config("allowlist", 10, 60));

    assert_eq!(guard.role("+15550001111"), "admin");
    assert_eq!(guard.role("15550001111"), "member"); // no '+': different canonical form
    assert_eq!(guard.role("+1 555 000 1111"), "admin");
    assert_eq!(guard.role("+15559999999"), "member"); // default role
}

#[test]
fn normalize_keeps_leading_plus_and_digits() {
    assert_eq!(normalize("+1 (555) 000-1111"), "+15550001111");
    assert_eq!(normalize("555.000.2222"), "5550002222");
    assert_eq!(normalize("00+49"), "0049"); // '+' only counts at position 0
    assert_eq!(normalize(""), "");
}

#[test]
fn normalize_is_idempotent() {
    for input in ["+1 (555) 000-1111", "15550002222", "+49-170-123"] {
        let once = normalize(input);
        assert_eq!(normalize(&once), once);
    }
}

#[test]
fn session_key_isolation() {
    let mut isolated = config("allowlist", 10, 60);
    isolated.session_isolation = true;
    let guard = Guard::new(&isolated);
    assert_eq!(guard.session_key("main", "+1 555-000-1111"), "main-wa-15550001111");

    let mut shared = config("allowlist", 10, 60);
    shared.session_isolation = false;
    let guard = Guard::new(&shared);
    assert_eq!(guard.session_key("main", "+15550001111"), "main");
}

#[test]
fn duplicate_phone_keeps_first_role() {
    let mut config = SecurityConfig::default();
    config
        .roles
        .insert("admin".to_string(), vec!["+111".to_string()]);
    config
        .roles
        .insert("viewer".to_string(), vec!["+111".to_string()]);

    let guard = Guard::new(&config);

    // BTreeMap iteration is alphabetical: "admin" is seen first.
    assert_eq!(guard.role("+111"), "admin");
}
