use super::*;
use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;

fn server() -> (WebhookServer, mpsc::Receiver<Event>, mpsc::Sender<Event>) {
    let client = Arc::new(
        Client::new("test-key", "42")
            .unwrap()
            .with_base_url("http://127.0.0.1:0"),
    );
    let (tx, rx) = mpsc::channel(16);
    let server = WebhookServer::new("127.0.0.1:0", "ABC", "", client);
    (server, rx, tx)
}

fn signed_server(secret: &str) -> (WebhookServer, mpsc::Receiver<Event>, mpsc::Sender<Event>) {
    let client = Arc::new(
        Client::new("test-key", "42")
            .unwrap()
            .with_base_url("http://127.0.0.1:0"),
    );
    let (tx, rx) = mpsc::channel(16);
    let server = WebhookServer::new("127.0.0.1:0", "ABC", secret, client);
    (server, rx, tx)
}

fn message_payload() -> String {
    r#"{
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": "42"},
                    "contacts": [{"profile": {"name": "Ada"}, "wa_id": "15557654321"}],
                    "messages": [{
                        "from": "15557654321",
                        "id": "wamid.hook",
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": {"body": "ping"}
                    }]
                }
            }]
        }]
    }"#
    .to_string()
}

fn sign(secret: &str, body: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[test]
fn verify_query_deserializes_hub_fields() {
    let query = "hub.mode=subscribe&hub.verify_token=test&hub.challenge=abc123";
    let parsed: VerifyQuery = serde_urlencoded::from_str(query).unwrap();
    assert_eq!(parsed.mode.as_deref(), Some("subscribe"));
    assert_eq!(parsed.verify_token.as_deref(), Some("test"));
    assert_eq!(parsed.challenge.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn verification_echoes_challenge_on_token_match() {
    let (server, _rx, tx) = server();
    let app = server.router(tx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=ABC&hub.challenge=XYZ")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"XYZ");
}

#[tokio::test]
async fn verification_rejects_wrong_token() {
    let (server, _rx, tx) = server();
    let app = server.router(tx);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=WRONG&hub.challenge=XYZ")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn post_emits_event_after_acknowledging() {
    let (server, mut rx, tx) = server();
    let app = server.router(tx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(message_payload()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.id, "wamid.hook");
    assert_eq!(event.from, "15557654321");
    assert_eq!(event.name, "Ada");
    assert_eq!(event.text, "ping");
}

#[tokio::test]
async fn post_rejects_bad_signature() {
    let (server, _rx, tx) = signed_server("s");
    let app = server.router(tx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("X-Hub-Signature-256", "sha256=deadbeef")
                .body(Body::from(message_payload()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_accepts_valid_signature() {
    let (server, mut rx, tx) = signed_server("s");
    let app = server.router(tx);
    let body = message_payload();
    let signature = sign("s", &body);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("X-Hub-Signature-256", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.id, "wamid.hook");
}

#[tokio::test]
async fn post_rejects_invalid_json() {
    let (server, _rx, tx) = server();
    let app = server.router(tx);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_returns_ok() {
    let (server, _rx, tx) = server();
    let app = server.router(tx);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[test]
fn signature_check_requires_prefix_and_match() {
    let body = b"payload";
    let valid = sign("secret", "payload");

    assert!(valid_signature(body, &valid, "secret"));
    assert!(!valid_signature(body, valid.trim_start_matches("sha256="), "secret"));
    assert!(!valid_signature(body, "sha256=deadbeef", "secret"));
    assert!(!valid_signature(body, "", "secret"));
}

#[test]
fn constant_time_eq_basics() {
    assert!(constant_time_eq(b"abc", b"abc"));
    assert!(!constant_time_eq(b"abc", b"abd"));
    assert!(!constant_time_eq(b"abc", b"ab"));
}
