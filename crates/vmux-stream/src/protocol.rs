//! The packet-type discipline: what to send when, on both directions of a
//! stream.
//!
//! Inbound and outbound STREAM frames carry a status: CONTINUE for
//! mid-stream data (empty payload meaning end-of-data), OK for the
//! successful termination handshake, ERROR for an abortive one. Every
//! function here runs under the owning client's lock; errors returned are
//! frame-queueing failures, which are fatal for the client, while per-stream
//! failures are handled locally by driving the stream to its terminal state.

use std::sync::Arc;

use bytes::Bytes;
use vmux_proto::{Frame, FrameStatus};

use crate::client::{OutboundFrame, RpcClient, SendFrameError};
use crate::data::DataIo;
use crate::error::StreamFault;
use crate::router;
use crate::set::{StreamEntry, StreamSet};

/// Outcome of one attempt at draining the inbound head into the data sink.
enum WriteData {
    /// The head packet was fully absorbed and acknowledged.
    Done,
    /// Partial write or sink would block; keep the head and wait for the
    /// next WRITABLE event.
    StillProcessing,
}

/// Write path (peer → data sink): drain queued inbound packets until the
/// sink blocks, the queue empties, or the stream turns terminal.
pub(crate) fn handle_write(client: &dyn RpcClient, entry: &mut StreamEntry) -> Result<(), SendFrameError> {
    while !entry.state.closed {
        let Some(status) = entry.state.inbound.front().map(|frame| frame.header.status) else {
            break;
        };

        match status {
            FrameStatus::CONTINUE => match write_data(client, entry)? {
                WriteData::StillProcessing => break,
                WriteData::Done => {}
            },
            FrameStatus::OK => {
                if let Some(frame) = entry.state.inbound.pop_front() {
                    handle_finish(client, entry, frame)?;
                }
            }
            _ => {
                if let Some(frame) = entry.state.inbound.pop_front() {
                    handle_abort(client, entry, frame)?;
                }
            }
        }
    }

    Ok(())
}

fn write_data(client: &dyn RpcClient, entry: &mut StreamEntry) -> Result<WriteData, SendFrameError> {
    let state = &mut entry.state;

    let (header, payload) = match state.inbound.front() {
        Some(head) => (head.header, head.payload.clone()),
        None => return Ok(WriteData::Done),
    };
    let remaining = &payload[state.write_offset..];

    match state.data.send(remaining) {
        Ok(DataIo::Progress(written)) if written < remaining.len() => {
            state.write_offset += written;
            trace!(written, left = remaining.len() - written, "Partial write into data sink");
            Ok(WriteData::StillProcessing)
        }
        Ok(DataIo::Progress(_)) => {
            state.inbound.pop_front();
            state.write_offset = 0;
            trace!(len = payload.len(), "Inbound data frame fully absorbed");

            // Return the credit the peer spent on this data frame.
            let reply = Frame::credit_reply(&header);
            if let Err(error) = client.send_frame(OutboundFrame::new(reply)) {
                warn!(%error, "Couldn’t return stream credit");
                client.immediate_close();
                return Err(error);
            }

            Ok(WriteData::Done)
        }
        Ok(DataIo::WouldBlock) => Ok(WriteData::StillProcessing),
        Err(error) => {
            warn!(%error, "Data sink failure");
            state.inbound.pop_front();
            state.write_offset = 0;
            state.closed = true;
            state.data.event_remove_callback();
            state.data.abort();

            let fault = StreamFault::from(error);
            entry.handle.program().send_reply_error(client, &header, &fault)?;
            Ok(WriteData::Done)
        }
    }
}

/// Read path (data source → peer): pull one buffer from the source and ship
/// it as a single outbound data frame, with a completion hook re-arming the
/// read once the transport drains it. At most one such frame is in flight
/// per stream.
pub(crate) fn handle_read(
    set: &Arc<StreamSet>,
    client: &dyn RpcClient,
    entry: &mut StreamEntry,
    maximum_payload_size: usize,
) -> Result<(), SendFrameError> {
    if !entry.state.tx_ready || entry.state.closed || entry.state.recv_eof {
        return Ok(());
    }

    let key = entry.handle.key();
    let mut buf = vec![0u8; maximum_payload_size];

    match entry.state.data.recv(&mut buf) {
        Ok(DataIo::WouldBlock) => Ok(()),
        Ok(DataIo::Progress(len)) => {
            entry.state.tx_ready = false;
            if len == 0 {
                debug!("Data source reached end-of-data");
                entry.state.recv_eof = true;
            }
            buf.truncate(len);

            entry.state.in_flight = true;
            let completion = router::transmit_completion(Arc::downgrade(set), Arc::clone(&entry.handle));
            let sent = entry.handle.program().send_stream_data(
                client,
                Some(completion),
                key.procedure,
                key.serial,
                Some(Bytes::from(buf)),
            );
            if sent.is_err() {
                entry.state.in_flight = false;
            }
            sent
        }
        Err(error) => {
            warn!(%error, "Data source failure");
            let fault = StreamFault::from(error);
            entry
                .handle
                .program()
                .send_stream_error(client, &fault, key.procedure, key.serial)
            // Terminal state is left to the event layer: the data object
            // reports ERROR next and the stream is torn down there.
        }
    }
}

/// The peer finished the stream: confirm with a zero-length STREAM OK, or an
/// error reply if completing the data object fails. Repeated finishes on a
/// terminal stream are dropped silently.
pub(crate) fn handle_finish(
    client: &dyn RpcClient,
    entry: &mut StreamEntry,
    inbound: Frame,
) -> Result<(), SendFrameError> {
    if entry.state.closed {
        return Ok(());
    }

    debug!("Peer finished stream");
    entry.state.closed = true;
    entry.state.data.event_remove_callback();

    let key = entry.handle.key();
    match entry.state.data.finish() {
        Ok(()) => entry
            .handle
            .program()
            .send_stream_data(client, None, key.procedure, key.serial, None),
        Err(error) => {
            warn!(%error, "Couldn’t complete data object");
            let fault = StreamFault::from(error);
            entry.handle.program().send_reply_error(client, &inbound.header, &fault)
        }
    }
}

/// The peer aborted the stream, or sent a status the state machine does not
/// know: tear the data object down and reply with the recorded error.
pub(crate) fn handle_abort(
    client: &dyn RpcClient,
    entry: &mut StreamEntry,
    inbound: Frame,
) -> Result<(), SendFrameError> {
    if entry.state.closed {
        return Ok(());
    }

    entry.state.closed = true;
    entry.state.data.event_remove_callback();
    entry.state.data.abort();

    let fault = if inbound.header.status == FrameStatus::ERROR {
        debug!("Stream aborted at client request");
        StreamFault::client_abort()
    } else {
        warn!(status = %inbound.header.status, "Stream aborted with unexpected status");
        StreamFault::unexpected_status(inbound.header.status)
    };

    entry.handle.program().send_reply_error(client, &inbound.header, &fault)
}
