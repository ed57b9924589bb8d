//! Event emitter.
//!
//! Encodes events and sends each one as a single datagram to the
//! configured group:
//! - **Sequential**: the caller's thread encodes and sends, and send errors
//!   are returned
//! - **Parallel fire-and-forget**: the caller encodes, the send runs on a
//!   worker pool, and failures are only logged and counted
//!
//! Before encoding, the emitter applies its character encoding and (if
//! configured) stamps `SiteID` on a copy of the event. The caller's event is
//! never modified.

use bytes::Bytes;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use evcast_core::error::{EvcastError, Result};
use evcast_core::pool::{BufferPool, PooledBuffer};
use evcast_core::socket::{open_sender, DatagramSocket};

use crate::codec::EventCodec;
use crate::config::{EmitterConfig, SendStrategy};
use crate::event::Event;
use crate::template::meta;
use crate::workers::WorkerPool;

/// An encoded datagram, either heap-owned or charged to a pool.
enum Datagram {
    Owned(Bytes),
    Pooled(PooledBuffer),
}

impl AsRef<[u8]> for Datagram {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Owned(bytes) => &bytes[..],
            Self::Pooled(buf) => &buf[..],
        }
    }
}

pub struct Emitter {
    config: EmitterConfig,
    codec: EventCodec,
    socket: Arc<dyn DatagramSocket>,
    pool: Option<BufferPool>,
    workers: Option<WorkerPool>,
    closed: AtomicBool,
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("endpoint", &self.config.endpoint)
            .field("strategy", &self.config.strategy)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Emitter {
    /// Open a sender socket for `config.endpoint`.
    pub fn new(config: EmitterConfig) -> Result<Self> {
        let socket = open_sender(&config.endpoint, &config.socket)?;
        Self::with_socket(config, socket)
    }

    /// Emit through an already opened socket.
    pub fn with_socket(config: EmitterConfig, socket: Arc<dyn DatagramSocket>) -> Result<Self> {
        let workers = match config.strategy {
            SendStrategy::Sequential => None,
            SendStrategy::ParallelFireAndForget => {
                Some(WorkerPool::owned(config.worker_threads, "evcast-emit")?)
            }
        };
        debug!(endpoint = %config.endpoint, strategy = ?config.strategy, "emitter opened");
        Ok(Self {
            config,
            codec: EventCodec::new(),
            socket,
            pool: None,
            workers,
            closed: AtomicBool::new(false),
            sent: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Draw encode buffers from `pool` instead of the heap.
    #[must_use]
    pub fn with_buffer_pool(mut self, pool: BufferPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Run fire-and-forget sends on an existing runtime instead of an
    /// owned one.
    #[must_use]
    pub fn with_worker_pool(mut self, handle: Handle) -> Self {
        if self.config.strategy == SendStrategy::ParallelFireAndForget {
            self.workers = Some(WorkerPool::shared(handle));
        }
        self
    }

    #[inline]
    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Encode `event` and send it as one datagram.
    ///
    /// Size and encoding failures are always returned. Socket errors are
    /// returned in sequential mode and only logged in fire-and-forget mode.
    pub fn emit(&self, event: &Event) -> Result<()> {
        if self.is_closed() {
            return Err(EvcastError::invalid_state("emitter is closed"));
        }

        let event = self.prepare(event)?;
        let size = self.codec.byte_count(&event)?;
        if size > self.config.max_datagram_size {
            return Err(EvcastError::MessageTooLarge {
                size,
                max: self.config.max_datagram_size,
            });
        }

        let datagram = match &self.pool {
            Some(pool) => {
                let closed = &self.closed;
                Datagram::Pooled(self.codec.encode_pooled(&event, pool, || {
                    closed.load(Ordering::Acquire)
                })?)
            }
            None => Datagram::Owned(self.codec.encode(&event)?),
        };

        match &self.workers {
            None => {
                self.socket.send(datagram.as_ref())?;
                self.sent.fetch_add(1, Ordering::Relaxed);
                trace!(event = event.name(), size, "event emitted");
                Ok(())
            }
            Some(workers) => {
                let socket = Arc::clone(&self.socket);
                let sent = Arc::clone(&self.sent);
                let failed = Arc::clone(&self.failed);
                workers.handle().spawn(async move {
                    match socket.send(datagram.as_ref()) {
                        Ok(_) => {
                            sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            warn!("fire-and-forget send failed: {}", e);
                        }
                    }
                });
                Ok(())
            }
        }
    }

    /// Apply the configured encoding and site id.
    fn prepare<'a>(&self, event: &'a Event) -> Result<Cow<'a, Event>> {
        let stamp_site = self
            .config
            .site_id
            .is_some_and(|id| event.get::<u16>(meta::SITE_ID).ok().flatten() != Some(id));
        if event.encoding() == self.config.encoding && !stamp_site {
            return Ok(Cow::Borrowed(event));
        }

        let mut event = event.clone();
        event.set_encoding(self.config.encoding);
        if let Some(site_id) = self.config.site_id {
            event.set(meta::SITE_ID, site_id)?;
        }
        Ok(Cow::Owned(event))
    }

    /// Datagrams handed to the socket successfully.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Fire-and-forget sends that failed.
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the socket. Later emits fail with `InvalidState`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.socket.close();
            debug!(endpoint = %self.config.endpoint, "emitter closed");
        }
    }
}

impl Drop for Emitter {
    fn drop(&mut self) {
        self.close();
    }
}
