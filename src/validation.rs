//! Input normalisation for user ids, item names and check-in tags.
//!
//! Ids and item names end up inside sled keys joined with `:`, so the
//! separator and control characters are rejected outright.

use std::collections::BTreeSet;

use crate::grove::GroveError;

/// Longest accepted user id.
pub const MAX_USER_ID_LEN: usize = 64;
/// Longest accepted fruit/item name.
pub const MAX_ITEM_NAME_LEN: usize = 32;
/// Tags longer than this are truncated.
pub const MAX_TAG_LEN: usize = 40;

const KEY_SEPARATOR: char = ':';

fn has_forbidden_chars(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_control() || c == KEY_SEPARATOR)
}

/// Validate a user id supplied by the auth layer.
pub fn validate_user_id(user_id: &str) -> Result<&str, GroveError> {
    if user_id.is_empty() || user_id.trim() != user_id {
        return Err(GroveError::InvalidUserId(preview_for_log(user_id, 32)));
    }
    if user_id.chars().count() > MAX_USER_ID_LEN || has_forbidden_chars(user_id) {
        return Err(GroveError::InvalidUserId(preview_for_log(user_id, 32)));
    }
    Ok(user_id)
}

/// Normalise an item name: trimmed, lowercased, non-empty, short and key-safe.
pub fn validate_item_name(name: &str) -> Result<String, GroveError> {
    let cleaned = name.trim().to_lowercase();
    if cleaned.is_empty() {
        return Err(GroveError::InvalidItemName("name is empty".to_string()));
    }
    if cleaned.chars().count() > MAX_ITEM_NAME_LEN {
        return Err(GroveError::InvalidItemName(format!(
            "'{}' is longer than {} characters",
            preview_for_log(&cleaned, MAX_ITEM_NAME_LEN),
            MAX_ITEM_NAME_LEN
        )));
    }
    if has_forbidden_chars(&cleaned) {
        return Err(GroveError::InvalidItemName(format!(
            "'{}' contains reserved characters",
            preview_for_log(&cleaned, MAX_ITEM_NAME_LEN)
        )));
    }
    Ok(cleaned)
}

/// Trim tags, drop blanks and control characters, cap length. The result is a set,
/// so tags that collapse to the same text count once.
pub fn normalize_tags(tags: &BTreeSet<String>) -> BTreeSet<String> {
    tags.iter()
        .map(|tag| {
            tag.chars()
                .filter(|c| !c.is_control())
                .collect::<String>()
                .trim()
                .chars()
                .take(MAX_TAG_LEN)
                .collect::<String>()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Single-line, bounded rendering of user text for log lines.
pub fn preview_for_log(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars) + 4);
    for (count, ch) in text.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push('?'),
            c => out.push(c),
        }
    }
    out
}
