use core::fmt;

use bytes::Bytes;
use vmux_proto::FrameStatus;

use crate::client::FilterRejected;
use crate::data::DataObjectError;
use crate::stream::StreamKey;

/// Error registering a stream into a client's stream set.
///
/// Any of these means the client connection is unusable for streaming; the
/// caller is expected to close it.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("a stream with key {0} is already registered for this client")]
    DuplicateKey(StreamKey),
    #[error("couldn’t install the data object event callback")]
    Events(#[source] DataObjectError),
    #[error("couldn’t install the inbound frame filter")]
    Filter(#[source] FilterRejected),
}

/// Error description carried by the terminal frames of an aborted stream.
///
/// The standard program implementation encodes the message as the UTF-8
/// payload of the frame; richer dispatch layers may encode it differently
/// through their own [`StreamProgram`](crate::StreamProgram).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFault {
    pub message: String,
}

impl StreamFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn unexpected_termination() -> Self {
        Self::new("stream had unexpected termination")
    }

    pub(crate) fn io_failure() -> Self {
        Self::new("stream had I/O failure")
    }

    pub(crate) fn client_abort() -> Self {
        Self::new("stream aborted at client request")
    }

    pub(crate) fn unexpected_status(status: FrameStatus) -> Self {
        Self::new(format!("stream aborted with unexpected status {}", status.0))
    }

    pub fn to_payload(&self) -> Bytes {
        Bytes::copy_from_slice(self.message.as_bytes())
    }
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<DataObjectError> for StreamFault {
    fn from(error: DataObjectError) -> Self {
        Self::new(error.to_string())
    }
}
