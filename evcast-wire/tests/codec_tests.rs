//! Wire codec behaviour against schemas, encodings and malformed input

use std::net::Ipv4Addr;
use std::sync::Arc;

use evcast_core::error::{EvcastError, WireFormatError};
use evcast_wire::db::{EventTemplateDb, MemoryTemplateDb};
use evcast_wire::encoding::CharacterEncoding;
use evcast_wire::prelude::*;

fn user_login_template() -> EventTemplate {
    EventTemplate::new(
        "UserLogin",
        [
            ("username", TypeToken::String),
            ("password", TypeToken::UInt64),
            ("clientIP", TypeToken::IpAddr),
            ("successful", TypeToken::Boolean),
            ("failedLogins", TypeToken::Int32),
            ("sessionSlot", TypeToken::UInt16),
            ("delta", TypeToken::Int16),
            ("uptime", TypeToken::UInt32),
            ("timestamp", TypeToken::Int64),
        ],
    )
}

fn user_login(template: TemplateRef) -> Event {
    let mut event = Event::from_template(template);
    event.set("username", "bob").unwrap();
    event.set("password", 0xfeed_abba_dead_beef_u64).unwrap();
    event.set("clientIP", Ipv4Addr::LOCALHOST).unwrap();
    event.set("successful", false).unwrap();
    event.set("failedLogins", -3i32).unwrap();
    event.set("sessionSlot", 65_535u16).unwrap();
    event.set("delta", -32_768i16).unwrap();
    event.set("uptime", u32::MAX).unwrap();
    event.set("timestamp", i64::MIN).unwrap();
    event
}

#[test]
fn test_user_login_survives_the_wire() {
    let db = Arc::new(MemoryTemplateDb::new());
    let template = db.register(user_login_template());
    let sent = user_login(template);

    let codec = EventCodec::with_template_db(db.clone());
    let bytes = codec.encode(&sent).unwrap();
    let received = codec.decode(&bytes).unwrap();

    assert_eq!(received, sent);
    assert_eq!(received.name(), "UserLogin");
    for ((a, va), (b, vb)) in sent.attributes().zip(received.attributes()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.token(), b.token());
        assert_eq!(va, vb);
    }
    assert_eq!(received.get::<u64>("password").unwrap(), Some(0xfeed_abba_dead_beef));
    assert_eq!(received.get::<Ipv4Addr>("clientIP").unwrap(), Some(Ipv4Addr::LOCALHOST));
    assert_eq!(received.get::<bool>("successful").unwrap(), Some(false));
}

#[test]
fn test_schema_free_decode_keeps_wire_types() {
    let sent = user_login(Arc::new(user_login_template()));
    let bytes = EventCodec::new().encode(&sent).unwrap();
    let received = EventCodec::new().decode(&bytes).unwrap();
    assert_eq!(received, sent);
    assert_eq!(
        received.template().get("sessionSlot").map(|a| a.token()),
        Some(TypeToken::UInt16)
    );
}

#[test]
fn test_schema_coerces_wire_values() {
    // Sender treats "count" as a string; the receiver's schema says int32.
    let db = Arc::new(MemoryTemplateDb::new());
    db.register(EventTemplate::new("Tick", [("count", TypeToken::Int32)]));
    let sent = Event::new("Tick").with("count", "123").unwrap();
    let bytes = EventCodec::new().encode(&sent).unwrap();

    let received = EventCodec::with_template_db(db).decode(&bytes).unwrap();
    assert_eq!(received.value("count"), Some(&AttributeValue::Int32(123)));
}

#[test]
fn test_schema_conflict_is_garbage() {
    let db = Arc::new(MemoryTemplateDb::new());
    db.register(EventTemplate::new("Tick", [("count", TypeToken::Boolean)]));
    let sent = Event::new("Tick").with("count", Ipv4Addr::LOCALHOST).unwrap();
    let bytes = EventCodec::new().encode(&sent).unwrap();

    let err = EventCodec::with_template_db(db).decode(&bytes).unwrap_err();
    assert!(matches!(err, WireFormatError::TypeConflict { .. }));
}

#[test]
fn test_encoding_switch_applies_to_values_only() {
    #[rustfmt::skip]
    let datagram: &[u8] = &[
        3, b'M', b's', b'g',
        0, 2,
        3, b'e', b'n', b'c', 2, 0, 0,
        3, b'w', b'h', b'o', 5, 0, 1, 0xE9,
    ];
    let event = EventCodec::new().decode(datagram).unwrap();
    assert_eq!(event.encoding(), CharacterEncoding::Iso8859_1);
    assert_eq!(event.get::<String>("who").unwrap().as_deref(), Some("é"));

    // The same value bytes without the switch are not valid UTF-8.
    #[rustfmt::skip]
    let utf8: &[u8] = &[
        3, b'M', b's', b'g',
        0, 1,
        3, b'w', b'h', b'o', 5, 0, 1, 0xE9,
    ];
    assert_eq!(
        EventCodec::new().decode(utf8).unwrap_err(),
        WireFormatError::InvalidString
    );
}

#[test]
fn test_latin1_event_encodes_single_bytes() {
    let mut event = Event::new("Msg");
    event.set_encoding(CharacterEncoding::Iso8859_1);
    event.set("who", "é€").unwrap();
    let bytes = EventCodec::new().encode(&event).unwrap();
    assert_eq!(&bytes[bytes.len() - 2..], &[0xE9, b'?']);
}

#[test]
fn test_validating_schema_rejects_unknown_attributes() {
    let db = MemoryTemplateDb::new().with_validation(true);
    db.register(user_login_template());
    let mut event = db.try_create_event("UserLogin").unwrap();

    assert!(matches!(
        event.set("nickname", "b"),
        Err(EvcastError::UnknownAttribute { .. })
    ));
    // Meta attributes are always accepted.
    event.set("SiteID", 4u16).unwrap();
    assert!(matches!(
        event.set("failedLogins", "many"),
        Err(EvcastError::TypeMismatch { .. })
    ));
}

#[test]
fn test_encode_limits() {
    let codec = EventCodec::new();
    let long_name = "n".repeat(256);
    assert!(matches!(
        codec.encode(&Event::new(long_name)),
        Err(EvcastError::NameTooLong { len: 256, .. })
    ));

    let event = Event::new("Big").with("blob", "x".repeat(65_536)).unwrap();
    assert!(matches!(
        codec.encode(&event),
        Err(EvcastError::StringTooLong { len: 65_536, .. })
    ));
}

#[test]
fn test_truncated_datagrams_never_panic() {
    let sent = user_login(Arc::new(user_login_template()));
    let bytes = EventCodec::new().encode(&sent).unwrap();
    for cut in 0..bytes.len() {
        assert!(
            matches!(
                EventCodec::new().decode(&bytes[..cut]),
                Err(WireFormatError::Truncated { .. })
            ),
            "prefix of {cut} bytes decoded"
        );
    }
}
