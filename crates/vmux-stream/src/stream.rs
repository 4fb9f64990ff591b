//! Per-stream identity and state.

use core::fmt;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::Span;
use vmux_proto::Frame;

use crate::client::FilterId;
use crate::data::{DataObject, StreamEvents};
use crate::program::StreamProgram;

/// Key identifying a stream within one client connection: the (procedure,
/// serial) pair of the originating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub procedure: u32,
    pub serial: u32,
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc#{}/s#{}", self.procedure, self.serial)
    }
}

/// Token identifying a registered stream within its set; stands in for the
/// data-object identity when events fire.
pub(crate) type StreamToken = u64;

/// A stream created by an RPC handler but not yet registered with a client's
/// stream set.
///
/// Takes exclusive ownership of the data object and shared ownership of the
/// originating program. Register it with [`StreamSet::add`](crate::StreamSet::add).
pub struct Stream {
    pub(crate) key: StreamKey,
    pub(crate) program: Arc<dyn StreamProgram>,
    pub(crate) data: Box<dyn DataObject>,
}

impl Stream {
    pub fn new(procedure: u32, serial: u32, program: Arc<dyn StreamProgram>, data: Box<dyn DataObject>) -> Self {
        Self {
            key: StreamKey { procedure, serial },
            program,
            data,
        }
    }

    pub fn key(&self) -> StreamKey {
        self.key
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Counted handle to a registered stream.
///
/// Holders are the owning set, any in-flight outbound data frame (through
/// its completion hook) and, transiently, the engine's own callbacks. The
/// stream's resources are torn down when the set unlinks it; the handle
/// itself goes away when the last holder drops it, which may be later if a
/// frame is still sitting in the transport queue.
pub struct StreamHandle {
    pub(crate) key: StreamKey,
    pub(crate) program: Arc<dyn StreamProgram>,
    pub(crate) token: StreamToken,
    pub(crate) span: Span,
}

impl StreamHandle {
    pub fn key(&self) -> StreamKey {
        self.key
    }

    pub(crate) fn program(&self) -> &dyn StreamProgram {
        &*self.program
    }

    pub(crate) fn token(&self) -> StreamToken {
        self.token
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

/// Mutable per-stream state. Guarded by the owning client's lock; nothing
/// here is touched without it.
pub(crate) struct StreamState {
    pub(crate) data: Box<dyn DataObject>,
    pub(crate) filter_id: Option<FilterId>,
    /// Inbound packets not yet fully consumed by the data sink. Head-only in
    /// the common case: the peer's credit window bounds its depth.
    pub(crate) inbound: VecDeque<Frame>,
    /// Offset of the first unwritten byte of the head packet's payload.
    pub(crate) write_offset: usize,
    /// No outbound data frame is in flight; the read path may run.
    pub(crate) tx_ready: bool,
    /// The data source signaled end-of-data; reads never re-arm.
    pub(crate) recv_eof: bool,
    /// Terminal: no further I/O in either direction.
    pub(crate) closed: bool,
    /// An outbound data frame is sitting in the transport queue.
    pub(crate) in_flight: bool,
}

impl StreamState {
    pub(crate) fn new(data: Box<dyn DataObject>) -> Self {
        Self {
            data,
            filter_id: None,
            inbound: VecDeque::new(),
            write_offset: 0,
            tx_ready: false,
            recv_eof: false,
            closed: false,
            in_flight: false,
        }
    }

    /// Events the data object should watch, as a pure function of state.
    pub(crate) fn armed_events(&self) -> StreamEvents {
        let mut events = StreamEvents::empty();
        if !self.inbound.is_empty() {
            events |= StreamEvents::WRITABLE;
        }
        if self.tx_ready && !self.recv_eof {
            events |= StreamEvents::READABLE;
        }
        events
    }
}
