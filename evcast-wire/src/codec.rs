//! Binary event codec.
//!
//! Layout of one datagram:
//!
//! ```text
//! EVENTWORD  u16 count  { ATTRIBUTEWORD  u8 type-token  value }*
//!
//! WORD    = u8 length, bytes (UTF-8)
//! string  = u16 length, bytes (event encoding)
//! ints    = big-endian, 2 / 4 / 8 bytes
//! ip_addr = 4 bytes, network order
//! boolean = 1 byte, 0 or 1
//! ```
//!
//! Names are always UTF-8. String values use the event's encoding, which a
//! leading `enc` attribute switches for the rest of that event only.
//!
//! Fast path:
//! - `byte_count` once, then write into an exactly sized buffer
//!
//! Decoding never panics on hostile input: every read is bounds-checked
//! and failures surface as [`WireFormatError`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use evcast_core::error::{EvcastError, Result, WireFormatError};
use evcast_core::pool::{BufferPool, PooledBuffer};

use crate::db::EventTemplateDb;
use crate::encoding::CharacterEncoding;
use crate::event::Event;
use crate::template::meta;
use crate::types::TypeToken;
use crate::value::AttributeValue;

/// Longest event or attribute name.
pub const MAX_WORD_LEN: usize = u8::MAX as usize;

/// Longest encoded string value.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Most attributes one event can carry.
pub const MAX_ATTRIBUTES: usize = u16::MAX as usize;

/// Stateless encoder / decoder, optionally backed by a template db.
#[derive(Clone, Default)]
pub struct EventCodec {
    db: Option<Arc<dyn EventTemplateDb>>,
}

impl fmt::Debug for EventCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCodec")
            .field("template_db", &self.db.is_some())
            .finish()
    }
}

fn word_len(word: &str) -> Result<usize> {
    if word.len() > MAX_WORD_LEN {
        return Err(EvcastError::NameTooLong {
            name: word.to_string(),
            len: word.len(),
        });
    }
    Ok(word.len())
}

fn value_len(name: &str, value: &AttributeValue, encoding: CharacterEncoding) -> Result<usize> {
    let size = value.byte_count(encoding);
    if value.token() == TypeToken::String && size - 2 > MAX_STRING_LEN {
        return Err(EvcastError::StringTooLong {
            attribute: name.to_string(),
            len: size - 2,
        });
    }
    Ok(size)
}

fn put_word<B: BufMut>(dst: &mut B, word: &str) {
    dst.put_u8(word.len() as u8);
    dst.put_slice(word.as_bytes());
}

#[inline]
fn need(src: &[u8], needed: usize) -> std::result::Result<(), WireFormatError> {
    if src.remaining() < needed {
        return Err(WireFormatError::Truncated {
            needed,
            remaining: src.remaining(),
        });
    }
    Ok(())
}

fn read_word(src: &mut &[u8]) -> std::result::Result<String, WireFormatError> {
    need(src, 1)?;
    let len = usize::from(src.get_u8());
    need(src, len)?;
    let word = CharacterEncoding::Utf8.decode(&src[..len])?;
    src.advance(len);
    Ok(word)
}

fn read_value(
    src: &mut &[u8],
    token: TypeToken,
    encoding: CharacterEncoding,
) -> std::result::Result<AttributeValue, WireFormatError> {
    let len = match token.fixed_size() {
        Some(size) => size,
        None => {
            need(src, 2)?;
            usize::from(src.get_u16())
        }
    };
    need(src, len)?;
    let value = match token {
        TypeToken::UInt16 => AttributeValue::UInt16(src.get_u16()),
        TypeToken::Int16 => AttributeValue::Int16(src.get_i16()),
        TypeToken::UInt32 => AttributeValue::UInt32(src.get_u32()),
        TypeToken::Int32 => AttributeValue::Int32(src.get_i32()),
        TypeToken::String => {
            let text = encoding.decode(&src[..len])?;
            src.advance(len);
            AttributeValue::String(text)
        }
        TypeToken::IpAddr => AttributeValue::IpAddr(Ipv4Addr::from(src.get_u32())),
        TypeToken::Int64 => AttributeValue::Int64(src.get_i64()),
        TypeToken::UInt64 => AttributeValue::UInt64(src.get_u64()),
        TypeToken::Boolean => AttributeValue::Boolean(src.get_u8() != 0),
    };
    Ok(value)
}

impl EventCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode against templates from `db`; unknown names fall back to ad
    /// hoc templates.
    #[must_use]
    pub fn with_template_db(db: Arc<dyn EventTemplateDb>) -> Self {
        Self { db: Some(db) }
    }

    pub fn template_db(&self) -> Option<&Arc<dyn EventTemplateDb>> {
        self.db.as_ref()
    }

    /// Exact encoded size of `event`, validating every length limit.
    pub fn byte_count(&self, event: &Event) -> Result<usize> {
        let count = event.len();
        if count > MAX_ATTRIBUTES {
            return Err(EvcastError::TooManyAttributes(count));
        }
        let mut total = 1 + word_len(event.name())? + 2;
        for (attr, value) in event.attributes() {
            total += 1 + word_len(attr.name())? + 1 + value_len(attr.name(), value, event.encoding())?;
        }
        Ok(total)
    }

    /// Encode into `dst`, returning the number of bytes written.
    pub fn encode_to<B: BufMut>(&self, event: &Event, dst: &mut B) -> Result<usize> {
        let size = self.byte_count(event)?;
        if dst.remaining_mut() < size {
            return Err(EvcastError::MessageTooLarge {
                size,
                max: dst.remaining_mut(),
            });
        }
        self.write(event, dst);
        Ok(size)
    }

    /// Encode into freshly allocated memory.
    pub fn encode(&self, event: &Event) -> Result<Bytes> {
        let size = self.byte_count(event)?;
        let mut out = BytesMut::with_capacity(size);
        self.write(event, &mut out);
        debug_assert_eq!(out.len(), size);
        Ok(out.freeze())
    }

    /// Encode into a buffer drawn from `pool`.
    ///
    /// `cancel` is handed to [`BufferPool::acquire`]; a cancelled or
    /// oversized acquisition is `BufferUnavailable`.
    pub fn encode_pooled(
        &self,
        event: &Event,
        pool: &BufferPool,
        cancel: impl Fn() -> bool,
    ) -> Result<PooledBuffer> {
        let size = self.byte_count(event)?;
        let mut buf = pool
            .acquire(size, cancel)
            .ok_or(EvcastError::BufferUnavailable)?;
        {
            let mut dst: &mut [u8] = &mut buf[..size];
            self.write(event, &mut dst);
        }
        buf.truncate(size);
        Ok(buf)
    }

    fn write<B: BufMut>(&self, event: &Event, dst: &mut B) {
        let encoding = event.encoding();
        put_word(dst, event.name());
        dst.put_u16(event.len() as u16);
        for (attr, value) in event.attributes() {
            put_word(dst, attr.name());
            dst.put_u8(value.token().as_u8());
            value.encode_to(dst, encoding);
        }
    }

    /// Decode one datagram.
    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<Event, WireFormatError> {
        let mut src = bytes;
        let name = read_word(&mut src)?;
        need(src, 2)?;
        let count = src.get_u16();

        let mut event = match self.db.as_ref().and_then(|db| db.try_get_template(&name)) {
            Some(template) => Event::from_template(template),
            None => Event::new(name),
        };

        let mut encoding = CharacterEncoding::default();
        for position in 0..count {
            let attr = read_word(&mut src)?;
            need(src, 1)?;
            let raw = src.get_u8();
            let token = TypeToken::from_u8(raw).ok_or(WireFormatError::UnknownTypeToken(raw))?;
            let value = read_value(&mut src, token, encoding)?;

            if attr == meta::ENCODING {
                if position != 0 {
                    return Err(WireFormatError::MisplacedEncoding);
                }
                let AttributeValue::Int16(selector) = value else {
                    return Err(WireFormatError::TypeConflict {
                        attribute: attr,
                        expected: TypeToken::Int16.name(),
                        actual: token.name(),
                    });
                };
                encoding = CharacterEncoding::from_selector(selector)
                    .ok_or(WireFormatError::InvalidEncoding(selector))?;
                event.set_encoding(encoding);
                continue;
            }
            event.put_decoded(&attr, value)?;
        }

        if src.has_remaining() {
            return Err(WireFormatError::TrailingBytes(src.remaining()));
        }
        Ok(event)
    }
}
