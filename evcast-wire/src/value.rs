//! Typed attribute values.

use bytes::BufMut;
use std::fmt;
use std::net::Ipv4Addr;

use crate::coercion;
use crate::encoding::CharacterEncoding;
use crate::types::TypeToken;

/// A concrete value of one of the nine wire types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    UInt16(u16),
    Int16(i16),
    UInt32(u32),
    Int32(i32),
    String(String),
    IpAddr(Ipv4Addr),
    Int64(i64),
    UInt64(u64),
    Boolean(bool),
}

impl AttributeValue {
    pub const fn token(&self) -> TypeToken {
        match self {
            Self::UInt16(_) => TypeToken::UInt16,
            Self::Int16(_) => TypeToken::Int16,
            Self::UInt32(_) => TypeToken::UInt32,
            Self::Int32(_) => TypeToken::Int32,
            Self::String(_) => TypeToken::String,
            Self::IpAddr(_) => TypeToken::IpAddr,
            Self::Int64(_) => TypeToken::Int64,
            Self::UInt64(_) => TypeToken::UInt64,
            Self::Boolean(_) => TypeToken::Boolean,
        }
    }

    /// Convert to `target`, or `None` if no coercion path exists for this
    /// value. Never fails loudly.
    #[inline]
    pub fn coerce_to(&self, target: TypeToken) -> Option<AttributeValue> {
        coercion::coerce(self, target)
    }

    /// Encoded size of the value, including a string's length prefix.
    ///
    /// Does not enforce the string length limit; the codec does that.
    pub fn byte_count(&self, encoding: CharacterEncoding) -> usize {
        match self {
            Self::String(s) => 2 + encoding.byte_count(s),
            other => other.token().fixed_size().unwrap_or_default(),
        }
    }

    /// Write the value in wire form. Strings use `encoding` and must fit
    /// a two-byte length prefix.
    pub fn encode_to<B: BufMut>(&self, dst: &mut B, encoding: CharacterEncoding) {
        match self {
            Self::UInt16(v) => dst.put_u16(*v),
            Self::Int16(v) => dst.put_i16(*v),
            Self::UInt32(v) => dst.put_u32(*v),
            Self::Int32(v) => dst.put_i32(*v),
            Self::String(s) => {
                let bytes = encoding.encode(s);
                dst.put_u16(bytes.len() as u16);
                dst.put_slice(&bytes);
            }
            Self::IpAddr(ip) => dst.put_slice(&ip.octets()),
            Self::Int64(v) => dst.put_i64(*v),
            Self::UInt64(v) => dst.put_u64(*v),
            Self::Boolean(b) => dst.put_u8(u8::from(*b)),
        }
    }

    /// Integer view of the numeric variants.
    pub(crate) fn as_integer(&self) -> Option<i128> {
        match *self {
            Self::UInt16(v) => Some(v.into()),
            Self::Int16(v) => Some(v.into()),
            Self::UInt32(v) => Some(v.into()),
            Self::Int32(v) => Some(v.into()),
            Self::Int64(v) => Some(v.into()),
            Self::UInt64(v) => Some(v.into()),
            Self::String(_) | Self::IpAddr(_) | Self::Boolean(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::IpAddr(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// Rust types that map onto a wire type.
pub trait AttributeType: Sized {
    const TOKEN: TypeToken;

    fn into_value(self) -> AttributeValue;

    /// Extract `Self` from a value already coerced to [`Self::TOKEN`].
    fn from_value(value: AttributeValue) -> Option<Self>;
}

macro_rules! attribute_type {
    ($ty:ty, $variant:ident) => {
        impl AttributeType for $ty {
            const TOKEN: TypeToken = TypeToken::$variant;

            #[inline]
            fn into_value(self) -> AttributeValue {
                AttributeValue::$variant(self)
            }

            #[inline]
            fn from_value(value: AttributeValue) -> Option<Self> {
                match value {
                    AttributeValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$ty> for AttributeValue {
            #[inline]
            fn from(value: $ty) -> Self {
                AttributeValue::$variant(value)
            }
        }
    };
}

attribute_type!(u16, UInt16);
attribute_type!(i16, Int16);
attribute_type!(u32, UInt32);
attribute_type!(i32, Int32);
attribute_type!(String, String);
attribute_type!(Ipv4Addr, IpAddr);
attribute_type!(i64, Int64);
attribute_type!(u64, UInt64);
attribute_type!(bool, Boolean);

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}
