//! Typed model of the frames exchanged on a vmux RPC connection.
//!
//! A connection carries discrete frames, each a header plus an opaque
//! payload. Calls, replies and asynchronous events share the connection with
//! zero or more data streams; a stream frame belongs to the call that opened
//! it and is identified by the (procedure, serial) pair of that call.
//!
//! Serialization is owned by the transport layer. This crate only defines
//! the in-memory shape and the constructors for the frames the stream engine
//! emits.

use core::fmt;

use bytes::Bytes;

/// Discriminates the role of a frame on the connection.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Client-initiated call.
    Call = 0,
    /// Server reply to a call, including the zero-length acknowledgements
    /// returning stream credit.
    Reply = 1,
    /// Server-initiated asynchronous event.
    Message = 2,
    /// Stream data or stream termination handshake.
    Stream = 3,
}

impl TryFrom<u32> for FrameKind {
    type Error = InvalidFrameKind;

    fn try_from(v: u32) -> Result<Self, InvalidFrameKind> {
        match v {
            0 => Ok(FrameKind::Call),
            1 => Ok(FrameKind::Reply),
            2 => Ok(FrameKind::Message),
            3 => Ok(FrameKind::Stream),
            _ => Err(InvalidFrameKind(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidFrameKind(pub u32);

impl std::error::Error for InvalidFrameKind {}

impl fmt::Display for InvalidFrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown frame kind value {}", self.0)
    }
}

/// Status carried by a frame header.
///
/// Peers are not guaranteed to send one of the three known values, so this is
/// a plain newtype rather than an enum: unknown statuses must survive
/// routing and are only rejected by the stream state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameStatus(pub u32);

impl FrameStatus {
    /// Successful call reply, or terminal stream handshake.
    pub const OK: Self = FrameStatus(0);

    /// Failed call reply, or abortive stream termination.
    pub const ERROR: Self = FrameStatus(1);

    /// Mid-stream data; an empty payload signals end-of-data.
    pub const CONTINUE: Self = FrameStatus(2);
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = match self.0 {
            0 => "OK",
            1 => "ERROR",
            2 => "CONTINUE",
            _ => "UNKNOWN",
        };
        write!(f, "{} ({})", desc, self.0)
    }
}

/// Header common to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// RPC program the frame belongs to.
    pub program: u32,
    /// Version of that program.
    pub version: u32,
    /// Procedure number of the originating call.
    pub procedure: u32,
    pub kind: FrameKind,
    /// Serial of the originating call; (procedure, serial) identifies a
    /// stream within one program.
    pub serial: u32,
    pub status: FrameStatus,
}

impl FrameHeader {
    pub fn is_stream(&self) -> bool {
        self.kind == FrameKind::Stream
    }
}

/// One frame: header plus opaque payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

// We don't want to print the payload content (usually too big).
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("header", &self.header)
            .field("payload.len()", &self.payload.len())
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Mid-stream data frame. An empty `payload` signals end-of-data to the
    /// peer.
    pub fn stream_data(program: u32, version: u32, procedure: u32, serial: u32, payload: Bytes) -> Self {
        Self {
            header: FrameHeader {
                program,
                version,
                procedure,
                kind: FrameKind::Stream,
                serial,
                status: FrameStatus::CONTINUE,
            },
            payload,
        }
    }

    /// Zero-length confirmation of a peer-initiated stream finish.
    pub fn stream_finished(program: u32, version: u32, procedure: u32, serial: u32) -> Self {
        Self {
            header: FrameHeader {
                program,
                version,
                procedure,
                kind: FrameKind::Stream,
                serial,
                status: FrameStatus::OK,
            },
            payload: Bytes::new(),
        }
    }

    /// Abortive stream termination carrying an encoded error.
    pub fn stream_error(program: u32, version: u32, procedure: u32, serial: u32, payload: Bytes) -> Self {
        Self {
            header: FrameHeader {
                program,
                version,
                procedure,
                kind: FrameKind::Stream,
                serial,
                status: FrameStatus::ERROR,
            },
            payload,
        }
    }

    /// Error reply bound to the call identity of `inbound`.
    pub fn reply_error(inbound: &FrameHeader, payload: Bytes) -> Self {
        Self {
            header: FrameHeader {
                kind: FrameKind::Reply,
                status: FrameStatus::ERROR,
                ..*inbound
            },
            payload,
        }
    }

    /// Zero-length REPLY acknowledging an absorbed inbound data frame.
    ///
    /// The peer counts outstanding calls and unacknowledged stream data
    /// frames against the same credit pool, so every fully absorbed data
    /// frame must be answered by exactly one of these.
    pub fn credit_reply(inbound: &FrameHeader) -> Self {
        Self {
            header: FrameHeader {
                kind: FrameKind::Reply,
                status: FrameStatus::OK,
                ..*inbound
            },
            payload: Bytes::new(),
        }
    }
}
