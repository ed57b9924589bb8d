//! # Evcast Wire
//!
//! Typed events, their binary encoding, and the pipelines that move them
//! over a multicast group.
//!
//! ## Overview
//!
//! - **Attribute model**: nine wire types, a total coercion table between
//!   them, templates and events (`types`, `value`, `coercion`, `template`,
//!   `event`, `db`)
//! - **Codec**: big-endian, length-prefixed, one event per datagram
//!   (`codec`, `encoding`)
//! - **Emitter**: sequential or fire-and-forget sends (`emitter`)
//! - **Listener**: threaded or pooled-task receive pipelines with sinks and
//!   garbage handling (`listener`, `sink`, `garbage`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use evcast_core::endpoint::Endpoint;
//! use evcast_wire::config::EmitterConfig;
//! use evcast_wire::emitter::Emitter;
//! use evcast_wire::event::Event;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let emitter = Emitter::new(EmitterConfig::new(Endpoint::parse("udp://224.1.1.11:9191")?))?;
//!     let event = Event::new("UserLogin")
//!         .with("username", "bob")?
//!         .with("failedLogins", 3i32)?;
//!     emitter.emit(&event)?;
//!     Ok(())
//! }
//! ```

// Allow some pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::match_same_arms)]
#![deny(unsafe_code)]

pub mod codec;
pub mod coercion;
pub mod config;
pub mod db;
pub mod emitter;
pub mod encoding;
pub mod event;
pub mod garbage;
pub mod listener;
pub mod sink;
pub mod template;
pub mod types;
pub mod value;
mod workers;

pub use codec::EventCodec;
pub use emitter::Emitter;
pub use event::Event;
pub use listener::Listener;

/// Prelude module for convenient imports
///
/// ```rust
/// use evcast_wire::prelude::*;
/// ```
pub mod prelude {
    pub use super::codec::EventCodec;
    pub use super::config::{EmitterConfig, ExecutionStrategy, ListenerConfig, SendStrategy};
    pub use super::db::{EventTemplateDb, MemoryTemplateDb};
    pub use super::emitter::Emitter;
    pub use super::encoding::CharacterEncoding;
    pub use super::event::Event;
    pub use super::garbage::{GarbageHandling, GarbageVote};
    pub use super::listener::{Listener, ListenerStatsSnapshot};
    pub use super::sink::{EventSink, SinkKey};
    pub use super::template::{EventTemplate, TemplateRef};
    pub use super::types::TypeToken;
    pub use super::value::{AttributeType, AttributeValue};
}
