//! Markdown → WhatsApp transcoding and message segmentation

use regex::Regex;
use std::sync::LazyLock;

/// WhatsApp message size limit in bytes (recommended split size).
pub const WHATSAPP_MESSAGE_LIMIT: usize = 4096;

// `**bold**` is rewritten through a sentinel byte so the single-star italic
// pass cannot see the markers it produces.
const BOLD_SENTINEL: char = '\u{1}';

static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static RE_ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static RE_STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").unwrap());
static RE_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,3} +(.+)$").unwrap());
static RE_BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^> ?").unwrap());

/// Convert Markdown formatting to WhatsApp-compatible formatting.
#[must_use]
pub fn markdown_to_whatsapp(text: &str) -> String {
    let sentinel = BOLD_SENTINEL.to_string();
    let result = RE_BOLD.replace_all(text, format!("{sentinel}$1{sentinel}").as_str());
    let result = RE_ITALIC.replace_all(&result, "_$1_");
    let result = result.replace(BOLD_SENTINEL, "*");
    let result = RE_STRIKE.replace_all(&result, "~$1~");
    let result = RE_HEADING.replace_all(&result, "*$1*");
    let result = RE_BLOCKQUOTE.replace_all(&result, "");
    result.into_owned()
}

/// Split `text` into chunks of at most `max` bytes.
///
/// Within the leading `max` bytes the split point is chosen in priority
/// order (paragraph break, line break, sentence end, word boundary), each
/// guarded by a minimum position of `max / 4`, falling back to a hard cut.
/// Chunks are trimmed of surrounding whitespace.
#[must_use]
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let min_split = max / 4;
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > max {
        let window = &rest[..floor_char_boundary(rest, max)];

        if let Some(i) = window.rfind("\n\n").filter(|&i| i >= min_split) {
            chunks.push(rest[..i].trim().to_string());
            rest = rest[i..].trim_start();
            continue;
        }

        if let Some(i) = window.rfind('\n').filter(|&i| i >= min_split) {
            chunks.push(rest[..i].trim().to_string());
            rest = rest[i..].trim_start();
            continue;
        }

        // Sentence end: split after the punctuation, dropping the space.
        let mut split_pos = None;
        for separator in [". ", "? ", "! "] {
            if let Some(i) = window.rfind(separator).filter(|&i| i >= min_split) {
                let pos = i + 1;
                if split_pos.map_or(true, |best| pos > best) {
                    split_pos = Some(pos);
                }
            }
        }
        if let Some(pos) = split_pos {
            chunks.push(rest[..pos].trim().to_string());
            rest = rest[pos..].trim_start();
            continue;
        }

        if let Some(i) = window.rfind(' ').filter(|&i| i >= min_split) {
            chunks.push(rest[..i].trim().to_string());
            rest = rest[i..].trim_start();
            continue;
        }

        let cut = floor_char_boundary(rest, max);
        chunks.push(rest[..cut].trim().to_string());
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        chunks.push(rest.trim().to_string());
    }

    chunks
}

/// Largest index `<= at` that is a char boundary of `text`.
fn floor_char_boundary(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}
