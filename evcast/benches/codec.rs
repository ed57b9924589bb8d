//! Codec benchmarks: encode and decode cost per event
//!
//! Measures a typical nine-attribute event with and without a schema on the
//! decode side, and pooled versus heap encoding.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use evcast::{
    BufferPool, BufferPoolOptions, Event, EventCodec, EventTemplate, MemoryTemplateDb, TypeToken,
};
use std::net::Ipv4Addr;
use std::sync::Arc;

fn template() -> EventTemplate {
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

fn event() -> Event {
    let mut event = Event::from_template(Arc::new(template()));
    event.set("username", "bob").unwrap();
    event.set("password", 0xfeed_abba_dead_beef_u64).unwrap();
    event.set("clientIP", Ipv4Addr::LOCALHOST).unwrap();
    event.set("successful", false).unwrap();
    event.set("failedLogins", 3i32).unwrap();
    event.set("sessionSlot", 12u16).unwrap();
    event.set("delta", -1i16).unwrap();
    event.set("uptime", 86_400u32).unwrap();
    event.set("timestamp", 1_700_000_000_000i64).unwrap();
    event
}

fn encode(c: &mut Criterion) {
    let codec = EventCodec::new();
    let event = event();
    let size = codec.byte_count(&event).unwrap();
    let pool = BufferPool::new(BufferPoolOptions::new().with_unit_size(256));

    let mut group = c.benchmark_group("codec/encode");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("heap", |b| b.iter(|| codec.encode(black_box(&event)).unwrap()));
    group.bench_function("pooled", |b| {
        b.iter(|| codec.encode_pooled(black_box(&event), &pool, || false).unwrap())
    });
    group.finish();
}

fn decode(c: &mut Criterion) {
    let bytes = EventCodec::new().encode(&event()).unwrap();
    let db = Arc::new(MemoryTemplateDb::new());
    db.register(template());

    let mut group = c.benchmark_group("codec/decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    let ad_hoc = EventCodec::new();
    group.bench_function("ad_hoc", |b| b.iter(|| ad_hoc.decode(black_box(&bytes)).unwrap()));
    let schema = EventCodec::with_template_db(db);
    group.bench_function("schema", |b| b.iter(|| schema.decode(black_box(&bytes)).unwrap()));
    group.finish();
}

criterion_group!(benches, encode, decode);
criterion_main!(benches);
