//! Per-client collection of active streams.

use std::sync::Arc;

use parking_lot::Mutex;
use vmux_proto::Frame;

use crate::client::{OutboundFrame, RpcClient};
use crate::config::StreamConfig;
use crate::data::StreamEvents;
use crate::error::RegisterError;
use crate::router::{self, StreamFilter};
use crate::stream::{Stream, StreamHandle, StreamState, StreamToken};

/// The set of active streams of one client connection.
///
/// Ordered-insertion collection with lookup by registration token; all
/// access is serialized under the set's own mutex, which acts as the
/// client's stream lock.
pub struct StreamSet {
    pub(crate) client: Arc<dyn RpcClient>,
    pub(crate) config: StreamConfig,
    pub(crate) inner: Mutex<SetInner>,
}

pub(crate) struct SetInner {
    /// Newest stream first; n is tiny, linear scans are fine.
    pub(crate) streams: Vec<StreamEntry>,
    next_token: StreamToken,
}

pub(crate) struct StreamEntry {
    pub(crate) handle: Arc<StreamHandle>,
    pub(crate) state: StreamState,
}

impl StreamEntry {
    /// Re-arm the data object for the events the current state calls for.
    /// Once terminal, the callback is already detached and nothing is armed.
    pub(crate) fn update_events(&mut self) {
        if self.state.closed {
            return;
        }
        self.state.data.event_update_callback(self.state.armed_events());
    }
}

impl SetInner {
    pub(crate) fn position(&self, token: StreamToken) -> Option<usize> {
        self.streams.iter().position(|entry| entry.handle.token() == token)
    }

    pub(crate) fn entry_mut(&mut self, token: StreamToken) -> Option<&mut StreamEntry> {
        self.streams.iter_mut().find(|entry| entry.handle.token() == token)
    }
}

impl StreamSet {
    pub fn new(client: Arc<dyn RpcClient>) -> Arc<Self> {
        Self::with_config(client, StreamConfig::new())
    }

    pub fn with_config(client: Arc<dyn RpcClient>, config: StreamConfig) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            inner: Mutex::new(SetInner {
                streams: Vec::new(),
                next_token: 0,
            }),
        })
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.inner.lock().streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().streams.is_empty()
    }

    /// Register `stream`, wiring up the inbound-frame filter and the
    /// data-object event callback.
    ///
    /// `transmit` arms the read path right away: pass `true` for streams
    /// where the daemon is the producer (downloads), `false` when the peer
    /// sends first (uploads).
    ///
    /// On error nothing is left installed and the caller is expected to
    /// close the client.
    pub fn add(self: &Arc<Self>, stream: Stream, transmit: bool) -> Result<Arc<StreamHandle>, RegisterError> {
        let Stream { key, program, data } = stream;

        let mut inner = self.inner.lock();

        if inner.streams.iter().any(|entry| entry.handle.key() == key) {
            return Err(RegisterError::DuplicateKey(key));
        }

        let token = inner.next_token;
        inner.next_token += 1;

        let span = info_span!("stream", procedure = key.procedure, serial = key.serial);
        let handle = Arc::new(StreamHandle {
            key,
            program,
            token,
            span: span.clone(),
        });
        let _enter = span.entered();

        let mut state = StreamState::new(data);

        // Wire the data object first, armed for nothing until the stream is
        // linked and the initial state is known.
        let callback = router::event_callback(Arc::downgrade(self), token);
        state
            .data
            .event_add_callback(StreamEvents::empty(), callback)
            .map_err(RegisterError::Events)?;

        let filter = StreamFilter::new(Arc::downgrade(self), &handle);
        match self.client.add_filter(Box::new(filter)) {
            Ok(filter_id) => state.filter_id = Some(filter_id),
            Err(rejected) => {
                state.data.event_remove_callback();
                return Err(RegisterError::Filter(rejected));
            }
        }

        state.tx_ready = transmit;

        inner.streams.insert(
            0,
            StreamEntry {
                handle: Arc::clone(&handle),
                state,
            },
        );
        debug!(%handle, transmit, "Stream registered");

        if let Some(entry) = inner.streams.first_mut() {
            entry.update_events();
        }

        Ok(handle)
    }

    /// Unregister a stream, detaching its filter and event callback and
    /// aborting the data object if the stream is not already terminal.
    ///
    /// Removing a stream that is already gone is a no-op.
    pub fn remove(&self, handle: &StreamHandle) {
        let mut inner = self.inner.lock();
        match inner.position(handle.token()) {
            Some(idx) => self.remove_locked(&mut inner, idx, true),
            None => trace!(%handle, "Stream already removed"),
        }
    }

    /// Bulk teardown for client shutdown. No credit is returned to the peer:
    /// the client is going away.
    pub fn remove_all(&self) {
        let mut inner = self.inner.lock();
        let count = inner.streams.len();
        while !inner.streams.is_empty() {
            self.remove_locked(&mut inner, 0, false);
        }
        if count > 0 {
            debug!(count, "Removed all client streams");
        }
    }

    /// Unlink and tear down the stream at `idx`.
    ///
    /// With `return_credit`, any inbound data frame the sink never fully
    /// absorbed is answered with a synthesized zero-length REPLY so the peer
    /// recovers the credit it spent on it; skipped when an outbound data
    /// frame is still in flight (the leftover is discarded once the
    /// transport drains) and on bulk teardown.
    pub(crate) fn remove_locked(&self, inner: &mut SetInner, idx: usize, return_credit: bool) {
        let mut entry = inner.streams.remove(idx);
        let _enter = entry.handle.span().clone().entered();

        if let Some(filter_id) = entry.state.filter_id.take() {
            self.client.remove_filter(filter_id);
        }

        if !entry.state.closed {
            entry.state.closed = true;
            entry.state.data.event_remove_callback();
            entry.state.data.abort();
        }

        if return_credit && !entry.state.in_flight {
            for frame in entry.state.inbound.drain(..) {
                let reply = Frame::credit_reply(&frame.header);
                if let Err(error) = self.client.send_frame(OutboundFrame::new(reply)) {
                    warn!(%error, "Couldn’t return credit for leftover inbound frame");
                    self.client.immediate_close();
                    break;
                }
            }
        }

        debug!(handle = %entry.handle, "Stream removed");
        // Dropping the entry releases the data object and the set's program
        // reference; the handle itself lives until its last holder drops.
    }
}
