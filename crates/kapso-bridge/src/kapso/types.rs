//! Meta-standard WhatsApp wire types (as used by Kapso)

use serde::{Deserialize, Serialize};

/// Top-level webhook delivery from Kapso.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Object type (`whatsapp_business_account`)
    pub object: String,
    /// Business account entries
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One business account entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    /// Business account ID
    pub id: String,
    /// Change notifications
    #[serde(default)]
    pub changes: Vec<Change>,
}

/// A single change notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    /// Field name (`messages` carries inbound traffic)
    pub field: String,
    /// The message data
    pub value: ChangeValue,
}

/// Message data inside a change.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    /// Messaging product (`whatsapp`)
    pub messaging_product: String,
    /// Receiving phone number metadata
    pub metadata: Metadata,
    /// Sender contacts
    #[serde(default)]
    pub contacts: Vec<Contact>,
    /// Inbound messages
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Metadata about the receiving phone number.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// Display phone number
    pub display_phone_number: String,
    /// Phone number ID
    pub phone_number_id: String,
}

/// A WhatsApp contact.
#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    /// Profile with the display name
    #[serde(default)]
    pub profile: Option<ContactProfile>,
    /// Contact phone number
    pub wa_id: String,
}

/// Contact profile.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactProfile {
    /// Display name
    pub name: String,
}

/// An incoming WhatsApp message.
///
/// The provider tags the message with a `type` string; exactly one of the
/// content fields is populated for known types. Unknown types carry none.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    /// Sender phone number (E.164 digits, may lack the leading `+`)
    #[serde(default)]
    pub from: String,
    /// Provider-assigned message ID (globally unique)
    #[serde(default)]
    pub id: String,
    /// Timestamp (RFC3339 or Unix epoch seconds)
    #[serde(default)]
    pub timestamp: String,
    /// Message type tag
    #[serde(rename = "type", default)]
    pub message_type: String,
    /// Text content
    pub text: Option<TextContent>,
    /// Image content
    pub image: Option<MediaContent>,
    /// Document content
    pub document: Option<MediaContent>,
    /// Audio content
    pub audio: Option<MediaContent>,
    /// Video content
    pub video: Option<MediaContent>,
    /// Location content
    pub location: Option<LocationContent>,
}

/// Text message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Message body
    pub body: String,
}

/// Media attachment metadata (image, document, audio, video).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaContent {
    /// Provider media ID
    #[serde(default)]
    pub id: String,
    /// MIME type
    #[serde(default)]
    pub mime_type: String,
    /// Caption
    #[serde(default)]
    pub caption: String,
    /// Filename (documents only)
    #[serde(default)]
    pub filename: String,
}

/// Shared location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationContent {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Place name
    #[serde(default)]
    pub name: String,
    /// Street address
    #[serde(default)]
    pub address: String,
}

/// Query parameters for listing messages.
#[derive(Debug, Clone, Default)]
pub struct ListMessagesParams {
    /// `inbound` or `outbound`
    pub direction: String,
    /// RFC3339 lower bound
    pub since: String,
    /// Page size
    pub limit: u32,
    /// Pagination cursor
    pub after: String,
}

/// Response from the list messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct ListMessagesResponse {
    /// Messages in the page
    #[serde(default)]
    pub data: Vec<InboundMessage>,
    /// Cursor-based paging info
    pub paging: Option<Paging>,
}

/// A message from the list API with Kapso-enhanced metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// The message itself
    #[serde(flatten)]
    pub message: Message,
    /// Recipient phone number
    #[serde(default)]
    pub to: String,
    /// Kapso metadata
    pub kapso: Option<KapsoMeta>,
}

/// Kapso-enhanced message metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct KapsoMeta {
    /// `inbound` or `outbound`
    #[serde(default)]
    pub direction: String,
    /// Delivery status
    #[serde(default)]
    pub status: String,
    /// Sender display name
    #[serde(default)]
    pub contact_name: String,
}

/// Cursor-based pagination info.
#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    /// Page cursors
    pub cursors: Cursors,
}

/// Pagination cursors.
#[derive(Debug, Clone, Deserialize)]
pub struct Cursors {
    /// Cursor for the next page
    #[serde(default)]
    pub after: String,
    /// Cursor for the previous page
    #[serde(default)]
    pub before: String,
}

/// Response from the send message API.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    /// Messaging product
    #[serde(default)]
    pub messaging_product: String,
    /// Message IDs assigned by the provider
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

/// A sent message reference.
#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    /// Provider-assigned message ID
    pub id: String,
}

/// Media download info.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfo {
    /// Download URL
    #[serde(default)]
    pub url: String,
    /// MIME type
    #[serde(default)]
    pub mime_type: String,
    /// Size in bytes
    #[serde(default)]
    pub file_size: u64,
}
