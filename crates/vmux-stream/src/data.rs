//! Capability contract of the hypervisor-side byte source/sink backing a
//! stream.

use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Event interest and fired-event set of a stream data object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamEvents: u8 {
        const READABLE = 0b0001;
        const WRITABLE = 0b0010;
        const ERROR    = 0b0100;
        const HANGUP   = 0b1000;
    }
}

/// Outcome of a non-blocking transfer on a data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataIo {
    /// `n` bytes were transferred. Zero returned by `recv` means the source
    /// reached end-of-data.
    Progress(usize),
    /// The operation cannot make progress right now; retry once the matching
    /// event fires.
    WouldBlock,
}

/// Failure reported by a data object.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DataObjectError {
    message: String,
}

impl DataObjectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Callback handed to the data-object event layer.
///
/// Receives the set of events that fired. Events are coalescing: the layer
/// may fire again before the previous invocation re-armed the interest set.
pub type EventCallback = Box<dyn FnMut(StreamEvents) + Send>;

/// Abstract byte source/sink backing one stream.
///
/// `send` and `recv` must never block: they report [`DataIo::WouldBlock`]
/// instead, and the event layer signals when to retry. The engine invokes
/// every method while holding the owning client's lock, so implementations
/// must not call back into the engine synchronously; events registered
/// through [`DataObject::event_add_callback`] are expected to be delivered
/// asynchronously by the event layer's own thread.
pub trait DataObject: Send {
    /// Push bytes into the data sink.
    fn send(&mut self, buf: &[u8]) -> Result<DataIo, DataObjectError>;

    /// Pull bytes from the data source. `Progress(0)` signals end-of-data.
    fn recv(&mut self, buf: &mut [u8]) -> Result<DataIo, DataObjectError>;

    /// Complete the stream successfully.
    fn finish(&mut self) -> Result<(), DataObjectError>;

    /// Abort the stream, discarding any buffered data.
    fn abort(&mut self);

    /// Install `callback`, initially armed for `interest`.
    fn event_add_callback(&mut self, interest: StreamEvents, callback: EventCallback)
        -> Result<(), DataObjectError>;

    /// Re-arm the installed callback for a new interest set. Only meaningful
    /// between `event_add_callback` and `event_remove_callback`.
    fn event_update_callback(&mut self, interest: StreamEvents);

    /// Detach the installed callback; no event fires afterwards.
    fn event_remove_callback(&mut self);
}

impl fmt::Debug for dyn DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObject").finish_non_exhaustive()
    }
}
