//! Capability contract of the RPC client connection the engine plugs into.

use core::fmt;

use vmux_proto::Frame;

/// Identifier of an installed inbound-frame filter.
pub type FilterId = u64;

/// Hook fired by the transport once a queued outbound frame has been fully
/// transmitted.
pub type FrameCompletion = Box<dyn FnOnce() + Send>;

/// A frame handed to the transport's send queue, with an optional
/// transmit-completion hook.
pub struct OutboundFrame {
    pub frame: Frame,
    pub completion: Option<FrameCompletion>,
}

impl OutboundFrame {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            completion: None,
        }
    }

    pub fn with_completion(frame: Frame, completion: FrameCompletion) -> Self {
        Self {
            frame,
            completion: Some(completion),
        }
    }
}

impl fmt::Debug for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundFrame")
            .field("frame", &self.frame)
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

/// The transport couldn't queue a frame for transmission.
///
/// Always fatal for the client connection: the engine either closes the
/// client itself or propagates this to a caller that must.
#[derive(Debug, thiserror::Error)]
#[error("couldn’t queue frame for transmission")]
pub struct SendFrameError;

/// The client refused to install an inbound-frame filter.
#[derive(Debug, thiserror::Error)]
#[error("client refused to install an inbound frame filter")]
pub struct FilterRejected;

/// Verdict of an inbound-frame filter.
#[derive(Debug)]
pub enum FilterVerdict {
    /// The filter took ownership of the frame; the transport must not
    /// dispatch it further.
    Consumed,
    /// Not ours; the transport continues normal dispatch with the returned
    /// frame.
    Declined(Frame),
    /// The frame is unprocessable in a way that poisons the connection; the
    /// transport must immediately close the client. Stream filters never
    /// produce this verdict; it completes the contract for other filter
    /// users.
    Fatal(Frame),
}

/// Hook allowing the engine to intercept selected inbound frames before
/// normal RPC dispatch.
pub trait FrameFilter: Send + Sync {
    fn filter(&self, frame: Frame) -> FilterVerdict;
}

/// Client connection capabilities the engine consumes.
///
/// `send_frame` must be non-blocking (queue internally). `add_filter` and
/// `remove_filter` are invoked while the engine holds its per-client lock,
/// so implementations must not synchronously invoke filters from them.
pub trait RpcClient: Send + Sync {
    /// Install an inbound-frame filter, invoked once per arriving frame
    /// before normal dispatch.
    fn add_filter(&self, filter: Box<dyn FrameFilter>) -> Result<FilterId, FilterRejected>;

    /// Detach a previously installed filter.
    fn remove_filter(&self, id: FilterId);

    /// Queue a frame for transmission to the peer.
    fn send_frame(&self, frame: OutboundFrame) -> Result<(), SendFrameError>;

    /// Tear the connection down without flushing the send queue.
    fn immediate_close(&self);

    /// Close the connection, flushing already queued frames.
    fn close(&self);
}
