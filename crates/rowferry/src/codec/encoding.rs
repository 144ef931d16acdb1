//! Text forms shared by the codecs.
//!
//! Values are rendered with [`to_text`](crate::core::convert::to_text) and
//! parsed with [`parse_text`](crate::core::convert::parse_text); these
//! helpers add what a text field needs to keep NULL distinct from text.

use std::borrow::Cow;

pub use crate::core::convert::{parse_text, to_text};
use crate::core::SqlValue;

const ESCAPE: char = '\\';

/// Field text for a value.
///
/// NULL becomes `null_token`. Text that starts with a backslash, or would
/// read back as the null token, gets one extra leading backslash.
pub fn encode_field<'v>(value: &'v SqlValue<'_>, null_token: &str) -> Cow<'v, str> {
    match to_text(value) {
        None => Cow::Owned(null_token.to_string()),
        Some(text) if needs_escape(&text, null_token) => Cow::Owned(format!("{}{}", ESCAPE, text)),
        Some(text) => text,
    }
}

fn needs_escape(text: &str, null_token: &str) -> bool {
    text.starts_with(ESCAPE) || text == null_token
}

/// Text of a field, or `None` for NULL. Inverse of [`encode_field`].
pub fn decode_field<'f>(field: &'f str, null_token: &str) -> Option<&'f str> {
    if field == null_token {
        None
    } else if let Some(rest) = field.strip_prefix(ESCAPE) {
        Some(rest)
    } else {
        Some(field)
    }
}
