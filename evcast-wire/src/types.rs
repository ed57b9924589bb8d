//! Wire type tokens.

use std::fmt;

/// The byte tag identifying an attribute's value type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeToken {
    UInt16 = 1,
    Int16 = 2,
    UInt32 = 3,
    Int32 = 4,
    String = 5,
    IpAddr = 6,
    Int64 = 7,
    UInt64 = 8,
    Boolean = 9,
}

impl TypeToken {
    /// Every token, in wire order.
    pub const ALL: [TypeToken; 9] = [
        Self::UInt16,
        Self::Int16,
        Self::UInt32,
        Self::Int32,
        Self::String,
        Self::IpAddr,
        Self::Int64,
        Self::UInt64,
        Self::Boolean,
    ];

    #[inline]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::UInt16),
            2 => Some(Self::Int16),
            3 => Some(Self::UInt32),
            4 => Some(Self::Int32),
            5 => Some(Self::String),
            6 => Some(Self::IpAddr),
            7 => Some(Self::Int64),
            8 => Some(Self::UInt64),
            9 => Some(Self::Boolean),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Zero-based position, for table lookups.
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize - 1
    }

    /// Encoded value size, or `None` for the variable-length string.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::UInt16 | Self::Int16 => Some(2),
            Self::UInt32 | Self::Int32 | Self::IpAddr => Some(4),
            Self::Int64 | Self::UInt64 => Some(8),
            Self::Boolean => Some(1),
            Self::String => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::UInt16 => "uint16",
            Self::Int16 => "int16",
            Self::UInt32 => "uint32",
            Self::Int32 => "int32",
            Self::String => "string",
            Self::IpAddr => "ip_addr",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_match_wire_values() {
        for (i, token) in TypeToken::ALL.iter().enumerate() {
            assert_eq!(token.index(), i);
            assert_eq!(TypeToken::from_u8(token.as_u8()), Some(*token));
        }
        assert_eq!(TypeToken::from_u8(0), None);
        assert_eq!(TypeToken::from_u8(10), None);
    }

    #[test]
    fn only_string_is_variable_length() {
        assert_eq!(TypeToken::String.fixed_size(), None);
        assert_eq!(TypeToken::IpAddr.fixed_size(), Some(4));
        assert_eq!(TypeToken::Boolean.fixed_size(), Some(1));
    }
}
