//! Text operation derivation and application.
//!
//! All offsets are `char` offsets. Slicing converts to byte offsets through
//! [`byte_offset`] so a multi-byte code point is never split.

use reportdesk_types::Operation;

use crate::error::{CollabError, Result};

/// Number of chars in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the char at `char_idx`, or `text.len()` past the end.
pub fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

/// Chars `start..end` of `text`.
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let from = byte_offset(text, start);
    let to = byte_offset(text, end.max(start));
    &text[from..to]
}

/// Compute the single insert/delete that turns `old` into `new`.
///
/// Uses the common prefix and suffix of the two strings, bounded so they
/// never overlap. `caret` is the caret position in `new` after the edit; the
/// prefix may not run past the point where the edit must have started, which
/// pins ambiguous edits (typing a letter next to the same letter) to where
/// the user actually typed. Pass `new`'s length when the caret is unknown.
/// Returns `None` when nothing changed.
pub fn derive(field: &str, old: &str, new: &str, caret: usize) -> Option<Operation> {
    if old == new {
        return None;
    }

    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();
    let shorter = old_chars.len().min(new_chars.len());
    let growth = new_chars.len().saturating_sub(old_chars.len());
    let caret = caret.min(new_chars.len());

    let prefix_bound = shorter.min(caret.saturating_sub(growth));
    let prefix = old_chars
        .iter()
        .zip(new_chars.iter())
        .take(prefix_bound)
        .take_while(|(a, b)| a == b)
        .count();

    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(shorter - prefix)
        .take_while(|(a, b)| a == b)
        .count();

    let deleted: String = old_chars[prefix..old_chars.len() - suffix].iter().collect();
    let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();
    if deleted.is_empty() && inserted.is_empty() {
        return None;
    }

    Some(Operation::replace(field, prefix, deleted, inserted))
}

/// Apply `op` to `text`, failing if the deleted range runs past the end.
pub fn apply_operation(text: &str, op: &Operation) -> Result<String> {
    let len = char_len(text);
    if op.deleted_end() > len {
        return Err(CollabError::OutOfRange {
            field: op.field.clone(),
            position: op.position,
            deleted: op.deleted_length,
            len,
        });
    }
    Ok(splice(text, op.position, op.deleted_length, &op.inserted_text))
}

/// Apply `op` to `text`, clamping position and deleted length to the text.
///
/// Returns the new text and the operation as actually applied, with
/// `deleted_text` set to what was really removed.
pub fn apply_operation_clamped(text: &str, op: &Operation) -> (String, Operation) {
    let len = char_len(text);
    let position = op.position.min(len);
    let deleted_length = op.deleted_length.min(len - position);

    let mut applied = op.clone();
    applied.position = position;
    applied.deleted_length = deleted_length;
    applied.deleted_text = char_slice(text, position, position + deleted_length).to_string();

    let result = splice(text, position, deleted_length, &op.inserted_text);
    (result, applied)
}

fn splice(text: &str, position: usize, deleted: usize, inserted: &str) -> String {
    let from = byte_offset(text, position);
    let to = byte_offset(text, position + deleted);
    let mut out = String::with_capacity(text.len() - (to - from) + inserted.len());
    out.push_str(&text[..from]);
    out.push_str(inserted);
    out.push_str(&text[to..]);
    out
}

/// Truncate `text` to at most `max_chars` chars, marking truncation with `…`.
pub fn preview(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let mut out = char_slice(text, 0, max_chars).to_string();
    out.push('…');
    out
}
