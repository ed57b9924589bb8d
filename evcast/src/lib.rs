//! # Evcast
//!
//! Best-effort, typed event notification over UDP multicast.
//!
//! ## Architecture
//!
//! Evcast is structured in layers:
//!
//! - **`evcast-core`**: Buffer pool, lock-free queue, stage lifecycle,
//!   datagram sockets (UDP multicast and in-process)
//! - **`evcast-wire`**: Typed events, the binary codec, emitter and listener
//!   pipelines
//! - **`evcast`**: Public API surface (this crate)
//!
//! An event is a named set of typed attributes. Each one travels as a
//! single datagram; there is no acknowledgement, retransmission or ordering
//! across senders.
//!
//! ## Quick Start
//!
//! ### Emitting
//!
//! ```rust,no_run
//! use evcast::prelude::*;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let emitter = Emitter::new(EmitterConfig::new(Endpoint::parse("udp://224.1.1.11:9191")?))?;
//!
//! let event = Event::new("UserLogin")
//!     .with("username", "bob")?
//!     .with("successful", false)?;
//! emitter.emit(&event)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Listening
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use evcast::prelude::*;
//!
//! struct Print;
//!
//! impl EventSink for Print {
//!     fn handle_event_arrival(&self, _key: &SinkKey, event: &Event) -> bool {
//!         println!("{event}");
//!         true
//!     }
//! }
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ListenerConfig::new(Endpoint::parse("udp://224.1.1.11:9191")?)
//!     .with_strategy(ExecutionStrategy::Parallel)
//!     .with_garbage_handling(GarbageHandling::IgnoreEndpointsThatSendGarbage);
//! let listener = Listener::new(config);
//! listener.add_sink(Arc::new(Print));
//! listener.start()?;
//! // ...
//! listener.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! - `unsafe` code is isolated to `evcast-core/src/queue.rs` (the linked queue)
//! - Codec, listener and emitter layers are 100% safe Rust

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dev_tracing;

pub use evcast_core::endpoint::{Endpoint, EndpointError};
pub use evcast_core::error::{EvcastError, Result, WireFormatError};
pub use evcast_core::lifecycle::StageState;
pub use evcast_core::monitor::{ListenerEvent, ListenerMonitor};
pub use evcast_core::options::SocketOptions;
pub use evcast_core::pool::{BufferPool, BufferPoolOptions};

pub use evcast_wire::codec::EventCodec;
pub use evcast_wire::config::{
    EmitterConfig, ExecutionStrategy, ListenerConfig, SendStrategy, MAX_DATAGRAM_SIZE,
};
pub use evcast_wire::db::{EventTemplateDb, MemoryTemplateDb};
pub use evcast_wire::emitter::Emitter;
pub use evcast_wire::encoding::CharacterEncoding;
pub use evcast_wire::event::Event;
pub use evcast_wire::garbage::{GarbageHandling, GarbageVote};
pub use evcast_wire::listener::{Listener, ListenerStatsSnapshot};
pub use evcast_wire::sink::{EventSink, SinkKey};
pub use evcast_wire::template::{meta, AttributeTemplate, EventTemplate, TemplateRef};
pub use evcast_wire::types::TypeToken;
pub use evcast_wire::value::{AttributeType, AttributeValue};

/// Convenient imports for emitting and listening.
///
/// # Example
///
/// ```rust
/// use evcast::prelude::*;
///
/// let event = Event::new("Ping").with("seq", 1u32).unwrap();
/// assert_eq!(event.get::<u32>("seq").unwrap(), Some(1));
/// ```
pub mod prelude {
    pub use crate::{
        BufferPool, CharacterEncoding, Emitter, EmitterConfig, Endpoint, Event, EventSink,
        EventTemplate, EvcastError, ExecutionStrategy, GarbageHandling, GarbageVote, Listener,
        ListenerConfig, SendStrategy, SinkKey, TypeToken,
    };
}
