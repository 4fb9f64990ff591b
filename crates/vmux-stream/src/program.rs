//! Capability contract of the RPC program a stream belongs to, plus the
//! standard implementation used by the daemon's dispatch tables.

use bytes::Bytes;
use vmux_proto::{Frame, FrameHeader};

use crate::client::{FrameCompletion, OutboundFrame, RpcClient, SendFrameError};
use crate::error::StreamFault;

/// Frame construction and queueing on behalf of one (program, version) pair.
pub trait StreamProgram: Send + Sync {
    /// Does this frame belong to this program?
    fn matches(&self, header: &FrameHeader) -> bool;

    /// Encode and queue an error reply bound to the call identity of
    /// `inbound`.
    fn send_reply_error(
        &self,
        client: &dyn RpcClient,
        inbound: &FrameHeader,
        fault: &StreamFault,
    ) -> Result<(), SendFrameError>;

    /// Encode and queue a STREAM ERROR frame for (procedure, serial).
    fn send_stream_error(
        &self,
        client: &dyn RpcClient,
        fault: &StreamFault,
        procedure: u32,
        serial: u32,
    ) -> Result<(), SendFrameError>;

    /// Encode and queue stream data (`Some`, empty payload meaning
    /// end-of-data) or the zero-length finish confirmation (`None`).
    /// `completion` fires once the frame has been fully transmitted.
    fn send_stream_data(
        &self,
        client: &dyn RpcClient,
        completion: Option<FrameCompletion>,
        procedure: u32,
        serial: u32,
        payload: Option<Bytes>,
    ) -> Result<(), SendFrameError>;
}

/// A concrete (program, version) pair using the standard frame model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcProgram {
    program: u32,
    version: u32,
}

impl RpcProgram {
    pub fn new(program: u32, version: u32) -> Self {
        Self { program, version }
    }

    pub fn program(&self) -> u32 {
        self.program
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl StreamProgram for RpcProgram {
    fn matches(&self, header: &FrameHeader) -> bool {
        header.program == self.program && header.version == self.version
    }

    fn send_reply_error(
        &self,
        client: &dyn RpcClient,
        inbound: &FrameHeader,
        fault: &StreamFault,
    ) -> Result<(), SendFrameError> {
        let frame = Frame::reply_error(inbound, fault.to_payload());
        client.send_frame(OutboundFrame::new(frame))
    }

    fn send_stream_error(
        &self,
        client: &dyn RpcClient,
        fault: &StreamFault,
        procedure: u32,
        serial: u32,
    ) -> Result<(), SendFrameError> {
        let frame = Frame::stream_error(self.program, self.version, procedure, serial, fault.to_payload());
        client.send_frame(OutboundFrame::new(frame))
    }

    fn send_stream_data(
        &self,
        client: &dyn RpcClient,
        completion: Option<FrameCompletion>,
        procedure: u32,
        serial: u32,
        payload: Option<Bytes>,
    ) -> Result<(), SendFrameError> {
        let frame = match payload {
            Some(bytes) => Frame::stream_data(self.program, self.version, procedure, serial, bytes),
            None => Frame::stream_finished(self.program, self.version, procedure, serial),
        };
        let outbound = match completion {
            Some(completion) => OutboundFrame::with_completion(frame, completion),
            None => OutboundFrame::new(frame),
        };
        client.send_frame(outbound)
    }
}
