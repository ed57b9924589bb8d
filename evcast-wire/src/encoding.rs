//! Character encodings for string attribute values.
//!
//! Event and attribute names always use the default encoding (UTF-8).
//! String values use the event's current encoding, which an `enc`
//! attribute in first position can switch to ISO-8859-1.

use std::borrow::Cow;
use std::fmt;

use evcast_core::error::WireFormatError;

/// Encoding selector carried by the `enc` meta attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CharacterEncoding {
    Iso8859_1,
    #[default]
    Utf8,
}

impl CharacterEncoding {
    /// Map an `enc` value to an encoding.
    pub const fn from_selector(selector: i16) -> Option<Self> {
        match selector {
            0 => Some(Self::Iso8859_1),
            1 => Some(Self::Utf8),
            _ => None,
        }
    }

    pub const fn selector(self) -> i16 {
        match self {
            Self::Iso8859_1 => 0,
            Self::Utf8 => 1,
        }
    }

    /// Encoded byte count of `text`.
    pub fn byte_count(self, text: &str) -> usize {
        match self {
            Self::Utf8 => text.len(),
            Self::Iso8859_1 => text.chars().count(),
        }
    }

    /// Encode `text`. Characters ISO-8859-1 cannot represent become `?`.
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        match self {
            Self::Utf8 => Cow::Borrowed(text.as_bytes()),
            Self::Iso8859_1 if text.is_ascii() => Cow::Borrowed(text.as_bytes()),
            Self::Iso8859_1 => Cow::Owned(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, WireFormatError> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| WireFormatError::InvalidString),
            Self::Iso8859_1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

impl fmt::Display for CharacterEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iso8859_1 => f.write_str("ISO-8859-1"),
            Self::Utf8 => f.write_str("UTF-8"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_is_one_byte_per_char() {
        let text = "café";
        assert_eq!(CharacterEncoding::Utf8.byte_count(text), 5);
        assert_eq!(CharacterEncoding::Iso8859_1.byte_count(text), 4);
        assert_eq!(
            CharacterEncoding::Iso8859_1.encode(text).as_ref(),
            b"caf\xe9"
        );
    }

    #[test]
    fn latin1_replaces_unrepresentable_chars() {
        let bytes = CharacterEncoding::Iso8859_1.encode("a€b");
        assert_eq!(bytes.as_ref(), b"a?b");
    }

    #[test]
    fn latin1_decodes_every_byte() {
        let decoded = CharacterEncoding::Iso8859_1.decode(b"caf\xe9").unwrap();
        assert_eq!(decoded, "café");
    }

    #[test]
    fn utf8_rejects_invalid_bytes() {
        assert_eq!(
            CharacterEncoding::Utf8.decode(b"caf\xe9"),
            Err(WireFormatError::InvalidString)
        );
    }

    #[test]
    fn selectors_round_trip() {
        assert_eq!(CharacterEncoding::from_selector(0), Some(CharacterEncoding::Iso8859_1));
        assert_eq!(CharacterEncoding::from_selector(1), Some(CharacterEncoding::Utf8));
        assert_eq!(CharacterEncoding::from_selector(2), None);
        assert_eq!(CharacterEncoding::Iso8859_1.selector(), 0);
    }
}
