use super::types::*;

#[test]
fn parses_meta_webhook_payload() {
    let raw = r#"{
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "123",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": "42"},
                    "contacts": [{"profile": {"name": "Ada"}, "wa_id": "15557654321"}],
                    "messages": [{
                        "from": "15557654321",
                        "id": "wamid.abc",
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": {"body": "hello"}
                    }]
                }
            }]
        }]
    }"#;

    let payload: WebhookPayload = serde_json::from_str(raw).unwrap();

    assert_eq!(payload.object, "whatsapp_business_account");
    let change = &payload.entry[0].changes[0];
    assert_eq!(change.field, "messages");
    let message = &change.value.messages[0];
    assert_eq!(message.message_type, "text");
    assert_eq!(message.text.as_ref().unwrap().body, "hello");
    assert_eq!(
        change.value.contacts[0].profile.as_ref().unwrap().name,
        "Ada"
    );
}

#[test]
fn parses_list_response_with_flattened_message() {
    let raw = r#"{
        "data": [{
            "from": "15557654321",
            "id": "wamid.xyz",
            "timestamp": "2026-01-02T03:04:05Z",
            "type": "image",
            "image": {"id": "media-1", "mime_type": "image/jpeg", "caption": "cat"},
            "to": "15550001111",
            "kapso": {"direction": "inbound", "status": "received", "contact_name": "Ada"}
        }],
        "paging": {"cursors": {"after": "next", "before": ""}}
    }"#;

    let response: ListMessagesResponse = serde_json::from_str(raw).unwrap();

    assert_eq!(response.data.len(), 1);
    let inbound = &response.data[0];
    assert_eq!(inbound.message.id, "wamid.xyz");
    assert_eq!(inbound.message.message_type, "image");
    assert_eq!(inbound.message.image.as_ref().unwrap().mime_type, "image/jpeg");
    assert_eq!(inbound.kapso.as_ref().unwrap().contact_name, "Ada");
    assert_eq!(response.paging.unwrap().cursors.after, "next");
}

#[test]
fn unknown_message_types_parse_without_content() {
    let raw = r#"{"from": "1", "id": "m1", "timestamp": "0", "type": "sticker"}"#;

    let message: Message = serde_json::from_str(raw).unwrap();

    assert_eq!(message.message_type, "sticker");
    assert!(message.text.is_none());
    assert!(message.image.is_none());
}

#[test]
fn parses_media_info() {
    let raw = r#"{"url": "https://cdn.example/x", "mime_type": "audio/ogg", "file_size": 512}"#;

    let media: MediaInfo = serde_json::from_str(raw).unwrap();

    assert_eq!(media.url, "https://cdn.example/x");
    assert_eq!(media.mime_type, "audio/ogg");
    assert_eq!(media.file_size, 512);
}

#[test]
fn parses_send_response_message_id() {
    let raw = r#"{"messaging_product": "whatsapp", "messages": [{"id": "wamid.out"}]}"#;

    let response: SendMessageResponse = serde_json::from_str(raw).unwrap();

    assert_eq!(response.messages[0].id, "wamid.out");
}
