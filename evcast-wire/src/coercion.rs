//! Coercion between wire types.
//!
//! Conversions are a 9×9 table of converter functions indexed by
//! `(source token, target token)`. A converter returns `None` when the
//! particular value cannot be represented in the target type; a `never`
//! entry marks pairs with no coercion path at all.
//!
//! Rules:
//! - Integer narrowing succeeds only when the value fits; widening always does
//! - Strings parse and format using each type's canonical text
//! - IP addresses convert to and from 32-bit integers by reinterpreting
//!   the address in network byte order, and to and from strings
//! - Booleans map to and from numbers as 0/1; other numbers do not convert

use std::net::Ipv4Addr;

use crate::types::TypeToken;
use crate::value::AttributeValue;

type Converter = fn(&AttributeValue) -> Option<AttributeValue>;

fn same(value: &AttributeValue) -> Option<AttributeValue> {
    Some(value.clone())
}

fn never(_: &AttributeValue) -> Option<AttributeValue> {
    None
}

macro_rules! integer_converter {
    ($name:ident, $ty:ty, $variant:ident $(, ip => $ip:expr)?) => {
        fn $name(value: &AttributeValue) -> Option<AttributeValue> {
            let out: $ty = match value {
                AttributeValue::String(s) => s.parse().ok()?,
                AttributeValue::Boolean(b) => <$ty>::from(*b),
                $(AttributeValue::IpAddr(ip) => ($ip)(*ip),)?
                other => <$ty>::try_from(other.as_integer()?).ok()?,
            };
            Some(AttributeValue::$variant(out))
        }
    };
}

integer_converter!(to_u16, u16, UInt16);
integer_converter!(to_i16, i16, Int16);
integer_converter!(to_u32, u32, UInt32, ip => |ip: Ipv4Addr| u32::from(ip));
integer_converter!(to_i32, i32, Int32, ip => |ip: Ipv4Addr| u32::from(ip) as i32);
integer_converter!(to_i64, i64, Int64);
integer_converter!(to_u64, u64, UInt64);

fn to_string(value: &AttributeValue) -> Option<AttributeValue> {
    Some(AttributeValue::String(value.to_string()))
}

fn to_ip(value: &AttributeValue) -> Option<AttributeValue> {
    let ip = match value {
        AttributeValue::UInt32(v) => Ipv4Addr::from(*v),
        AttributeValue::Int32(v) => Ipv4Addr::from(*v as u32),
        AttributeValue::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Some(AttributeValue::IpAddr(ip))
}

fn to_bool(value: &AttributeValue) -> Option<AttributeValue> {
    let b = match value {
        AttributeValue::String(s) if s.eq_ignore_ascii_case("true") => true,
        AttributeValue::String(s) if s.eq_ignore_ascii_case("false") => false,
        other => match other.as_integer()? {
            0 => false,
            1 => true,
            _ => return None,
        },
    };
    Some(AttributeValue::Boolean(b))
}

#[rustfmt::skip]
static TABLE: [[Converter; 9]; 9] = [
    //  uint16    int16   uint32  int32   string     ip      int64   uint64  boolean
    [same,    to_i16, to_u32, to_i32, to_string, never,  to_i64, to_u64, to_bool], // uint16
    [to_u16,  same,   to_u32, to_i32, to_string, never,  to_i64, to_u64, to_bool], // int16
    [to_u16,  to_i16, same,   to_i32, to_string, to_ip,  to_i64, to_u64, to_bool], // uint32
    [to_u16,  to_i16, to_u32, same,   to_string, to_ip,  to_i64, to_u64, to_bool], // int32
    [to_u16,  to_i16, to_u32, to_i32, same,      to_ip,  to_i64, to_u64, to_bool], // string
    [never,   never,  to_u32, to_i32, to_string, same,   never,  never,  never  ], // ip
    [to_u16,  to_i16, to_u32, to_i32, to_string, never,  same,   to_u64, to_bool], // int64
    [to_u16,  to_i16, to_u32, to_i32, to_string, never,  to_i64, same,   to_bool], // uint64
    [to_u16,  to_i16, to_u32, to_i32, to_string, never,  to_i64, to_u64, same   ], // boolean
];

/// Coerce `value` to `target`.
#[inline]
pub fn coerce(value: &AttributeValue, target: TypeToken) -> Option<AttributeValue> {
    TABLE[value.token().index()][target.index()](value)
}

/// Whether any value of type `from` can ever coerce to `to`.
pub fn has_path(from: TypeToken, to: TypeToken) -> bool {
    use TypeToken::{Int32, IpAddr, String, UInt32};
    match (from, to) {
        (IpAddr, IpAddr) => true,
        (IpAddr, other) | (other, IpAddr) => matches!(other, UInt32 | Int32 | String),
        _ => true,
    }
}
