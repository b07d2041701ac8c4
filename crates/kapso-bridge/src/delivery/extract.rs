//! Inbound message content extraction
//!
//! Converts a provider message of any supported type into a single text
//! representation for the gateway, or skips it. Unsupported types trigger a
//! one-shot WhatsApp reply to the sender.

use crate::kapso::{Client, LocationContent, Message};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract gateway-ready text from an inbound message.
///
/// Returns `None` when the message should be skipped (missing content for a
/// declared type, or an unsupported type).
pub async fn extract_text(msg: &Message, client: &Arc<Client>) -> Option<String> {
    match msg.message_type.as_str() {
        "text" => msg.text.as_ref().map(|t| t.body.clone()),

        "image" => match &msg.image {
            Some(media) => {
                Some(format_media("image", &media.caption, &media.mime_type, &media.id, client).await)
            }
            None => None,
        },

        "document" => match &msg.document {
            Some(media) => {
                let label = if media.filename.is_empty() {
                    &media.caption
                } else {
                    &media.filename
                };
                Some(format_media("document", label, &media.mime_type, &media.id, client).await)
            }
            None => None,
        },

        "audio" => match &msg.audio {
            Some(media) => Some(format_media("audio", "", &media.mime_type, &media.id, client).await),
            None => None,
        },

        "video" => match &msg.video {
            Some(media) => {
                Some(format_media("video", &media.caption, &media.mime_type, &media.id, client).await)
            }
            None => None,
        },

        "location" => msg.location.as_ref().map(format_location),

        other => {
            warn!(
                message_type = %other,
                from = %msg.from,
                id = %msg.id,
                "unsupported message type"
            );
            notify_unsupported(&msg.from, other, client);
            None
        }
    }
}

/// Build a text representation for a media attachment. The download URL is
/// retrieved best-effort and omitted on failure.
async fn format_media(
    kind: &str,
    label: &str,
    mime_type: &str,
    media_id: &str,
    client: &Arc<Client>,
) -> String {
    let mut parts = vec![format!("[{kind}]")];
    if !label.is_empty() {
        parts.push(label.to_string());
    }
    if !mime_type.is_empty() {
        parts.push(format!("({mime_type})"));
    }

    if !media_id.is_empty() {
        match client.media_url(media_id).await {
            Ok(media) if !media.url.is_empty() => parts.push(media.url),
            Ok(_) => {}
            Err(error) => {
                debug!(media_id = %media_id, %error, "could not retrieve media URL");
            }
        }
    }

    parts.join(" ")
}

fn format_location(location: &LocationContent) -> String {
    let mut parts = vec!["[location]".to_string()];
    if !location.name.is_empty() {
        parts.push(location.name.clone());
    }
    if !location.address.is_empty() {
        parts.push(location.address.clone());
    }
    parts.push(format!(
        "({:.6}, {:.6})",
        location.latitude, location.longitude
    ));
    parts.join(" ")
}

/// Fire-and-forget reply informing the sender their message type is not
/// supported.
fn notify_unsupported(from: &str, message_type: &str, client: &Arc<Client>) {
    let to = ensure_plus(from);
    let reply = format!(
        "Sorry, I can't process {message_type} messages yet. Please send text instead."
    );
    let client = Arc::clone(client);
    tokio::spawn(async move {
        if let Err(error) = client.send_text(&to, &reply).await {
            warn!(to = %to, %error, "failed to send unsupported-type notice");
        }
    });
}

/// Prefix a phone number with `+` if it lacks one.
pub fn ensure_plus(number: &str) -> String {
    if number.starts_with('+') {
        number.to_string()
    } else {
        format!("+{number}")
    }
}
