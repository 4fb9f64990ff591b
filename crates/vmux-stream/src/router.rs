//! Glue between the client transport, the data-object event layer and the
//! stream protocol: inbound frame routing, event arbitration, transmit
//! completion.

use std::sync::{Arc, Weak};

use tracing::Span;
use vmux_proto::{Frame, FrameStatus};

use crate::client::{FilterVerdict, FrameCompletion, FrameFilter};
use crate::data::{EventCallback, StreamEvents};
use crate::error::StreamFault;
use crate::program::StreamProgram;
use crate::protocol;
use crate::set::StreamSet;
use crate::stream::{StreamHandle, StreamKey, StreamToken};

/// Inbound filter installed on the client for one stream: diverts any frame
/// matching the stream key into that stream's queue, ahead of normal
/// dispatch.
pub(crate) struct StreamFilter {
    set: Weak<StreamSet>,
    program: Arc<dyn StreamProgram>,
    key: StreamKey,
    token: StreamToken,
    span: Span,
}

impl StreamFilter {
    pub(crate) fn new(set: Weak<StreamSet>, handle: &Arc<StreamHandle>) -> Self {
        Self {
            set,
            program: Arc::clone(&handle.program),
            key: handle.key(),
            token: handle.token(),
            span: handle.span().clone(),
        }
    }
}

impl FrameFilter for StreamFilter {
    fn filter(&self, frame: Frame) -> FilterVerdict {
        if !frame.header.is_stream()
            || !self.program.matches(&frame.header)
            || frame.header.procedure != self.key.procedure
            || frame.header.serial != self.key.serial
        {
            return FilterVerdict::Declined(frame);
        }

        let Some(set) = self.set.upgrade() else {
            return FilterVerdict::Declined(frame);
        };

        let _enter = self.span.clone().entered();
        let mut inner = set.inner.lock();
        let Some(entry) = inner.entry_mut(self.token) else {
            // Raced against removal; the filter goes away shortly.
            return FilterVerdict::Declined(frame);
        };

        trace!(status = %frame.header.status, len = frame.payload.len(), "Queued inbound stream frame");
        entry.state.inbound.push_back(frame);
        entry.update_events();
        FilterVerdict::Consumed
    }
}

/// Builds the callback registered with the data-object event layer.
pub(crate) fn event_callback(set: Weak<StreamSet>, token: StreamToken) -> EventCallback {
    Box::new(move |events| {
        if let Some(set) = set.upgrade() {
            set.dispatch_events(token, events);
        }
    })
}

/// Builds the hook fired by the transport once an outbound data frame has
/// been fully transmitted. Holds a stream reference for the lifetime of the
/// queued frame.
pub(crate) fn transmit_completion(set: Weak<StreamSet>, handle: Arc<StreamHandle>) -> FrameCompletion {
    Box::new(move || {
        if let Some(set) = set.upgrade() {
            set.frame_transmitted(&handle);
        }
        // `handle` drops here, releasing the in-flight reference.
    })
}

impl StreamSet {
    /// Entry point of the data-object event callback: arbitrates between
    /// "sink is writable", "source is readable" and "a control packet is
    /// queued", then drives teardown or re-arms the interest set.
    pub(crate) fn dispatch_events(self: &Arc<Self>, token: StreamToken, events: StreamEvents) {
        let client = Arc::clone(&self.client);
        let mut inner = self.inner.lock();

        let Some(idx) = inner.position(token) else {
            // Coalesced event racing against removal.
            return;
        };

        let _enter = inner.streams[idx].handle.span().clone().entered();
        trace!(?events, "Stream event");

        if events.contains(StreamEvents::WRITABLE) {
            let entry = &mut inner.streams[idx];
            if protocol::handle_write(client.as_ref(), entry).is_err() {
                self.remove_locked(&mut inner, idx, true);
                client.close();
                return;
            }
        }

        if events.intersects(StreamEvents::READABLE | StreamEvents::HANGUP) && !inner.streams[idx].state.recv_eof {
            let entry = &mut inner.streams[idx];
            if protocol::handle_read(self, client.as_ref(), entry, self.config.maximum_payload_size).is_err() {
                self.remove_locked(&mut inner, idx, true);
                client.close();
                return;
            }
        }

        // A terminal packet may be sitting at the head of the queue even
        // when no byte of it goes through the sink: process its status
        // unconditionally.
        {
            let entry = &mut inner.streams[idx];
            let head_is_control = entry
                .state
                .inbound
                .front()
                .is_some_and(|frame| frame.header.status != FrameStatus::CONTINUE);
            if head_is_control {
                if let Some(frame) = entry.state.inbound.pop_front() {
                    let result = if frame.header.status == FrameStatus::OK {
                        protocol::handle_finish(client.as_ref(), entry, frame)
                    } else {
                        protocol::handle_abort(client.as_ref(), entry, frame)
                    };
                    if result.is_err() {
                        self.remove_locked(&mut inner, idx, true);
                        client.close();
                        return;
                    }
                }
            }
        }

        if events.intersects(StreamEvents::ERROR | StreamEvents::HANGUP) && !inner.streams[idx].state.closed {
            let entry = &mut inner.streams[idx];
            entry.state.closed = true;
            entry.state.data.event_remove_callback();
            entry.state.data.abort();

            let fault = if events.contains(StreamEvents::HANGUP) {
                StreamFault::unexpected_termination()
            } else {
                StreamFault::io_failure()
            };
            warn!(%fault, "Stream terminated by event layer");

            let program = Arc::clone(&entry.handle.program);
            let key = entry.handle.key();
            if program
                .send_stream_error(client.as_ref(), &fault, key.procedure, key.serial)
                .is_err()
            {
                self.remove_locked(&mut inner, idx, true);
                client.close();
                return;
            }
        }

        if inner.streams[idx].state.closed {
            self.remove_locked(&mut inner, idx, true);
        } else {
            inner.streams[idx].update_events();
        }
    }

    /// Transmit-completion entry point: the outbound data frame left the
    /// send queue, so the read path may produce the next one.
    pub(crate) fn frame_transmitted(&self, handle: &StreamHandle) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entry_mut(handle.token()) else {
            // The stream was removed while the frame was in flight.
            return;
        };

        let _enter = entry.handle.span().clone().entered();
        entry.state.in_flight = false;
        entry.state.tx_ready = true;
        entry.update_events();
        trace!("Outbound data frame transmitted");
    }
}
