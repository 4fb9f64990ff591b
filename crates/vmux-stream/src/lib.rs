//! Server-side stream multiplexing engine for the vmux RPC layer.
//!
//! A vmux connection interleaves bidirectional bulk-data streams (console
//! I/O, disk image transfer, migration data) within the regular
//! request/reply traffic. Each stream belongs to the call that opened it and
//! is identified by the (procedure, serial) pair of that call.
//!
//! The engine mediates between two asymmetric interfaces: the framed message
//! transport carrying discrete packets to and from the remote peer, and the
//! hypervisor-side data object producing and consuming opaque byte buffers,
//! either side of which may transiently block. It owns the per-stream state
//! machine, demultiplexes inbound frames into the right stream, bounds
//! in-flight data in both directions, and guarantees that teardown releases
//! every resource exactly once.
//!
//! All per-client mutation is serialized under a single lock owned by the
//! [`StreamSet`]; the engine's callbacks acquire it at entry and release it
//! at exit, and never sleep on external I/O while holding it.

#[macro_use]
extern crate tracing;

mod client;
mod config;
mod data;
mod error;
mod program;
mod protocol;
mod router;
mod set;
mod stream;

pub use self::client::{
    FilterId, FilterRejected, FilterVerdict, FrameCompletion, FrameFilter, OutboundFrame, RpcClient, SendFrameError,
};
pub use self::config::StreamConfig;
pub use self::data::{DataIo, DataObject, DataObjectError, EventCallback, StreamEvents};
pub use self::error::{RegisterError, StreamFault};
pub use self::program::{RpcProgram, StreamProgram};
pub use self::set::StreamSet;
pub use self::stream::{Stream, StreamHandle, StreamKey};
