//! Opaque connection cursors: `base64("arrayconnection:<offset>")`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::errors::TranslationError;

const CURSOR_PREFIX: &str = "arrayconnection:";

/// Largest list position a statement can address; Cypher integers are `i64`.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

pub fn offset_to_cursor(offset: u64) -> String {
    BASE64.encode(format!("{}{}", CURSOR_PREFIX, offset))
}

pub fn cursor_to_offset(cursor: &str) -> Result<u64, TranslationError> {
    let invalid = || TranslationError::schema(format!("Invalid cursor `{}`", cursor));
    let bytes = BASE64.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix(CURSOR_PREFIX)
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|offset| *offset <= MAX_OFFSET)
        .ok_or_else(invalid)
}

/// First position after the one `cursor` points at.
pub fn offset_after(cursor: &str) -> Result<u64, TranslationError> {
    cursor_to_offset(cursor)?
        .checked_add(1)
        .filter(|offset| *offset <= MAX_OFFSET)
        .ok_or_else(|| TranslationError::schema(format!("Invalid cursor `{}`", cursor)))
}
