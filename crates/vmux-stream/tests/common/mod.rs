//! Mock collaborators for exercising the stream engine: a client transport
//! recording outbound frames and a scripted data object.

#![allow(dead_code)] // not every suite uses every helper

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use vmux_proto::{Frame, FrameHeader, FrameKind, FrameStatus};
use vmux_stream::{
    DataIo, DataObject, DataObjectError, EventCallback, FilterId, FilterRejected, FilterVerdict, FrameCompletion,
    FrameFilter, OutboundFrame, RpcClient, RpcProgram, SendFrameError, Stream, StreamEvents, StreamHandle, StreamSet,
};

pub const PROGRAM: u32 = 0x2008_1119;
pub const VERSION: u32 = 1;

// ---------------------- //

#[derive(Default)]
struct ClientState {
    next_filter_id: FilterId,
    filters: Vec<(FilterId, Arc<dyn FrameFilter>)>,
    sent: Vec<Frame>,
    completions: VecDeque<FrameCompletion>,
    reject_filters: bool,
    fail_sends: bool,
    closed: bool,
    immediately_closed: bool,
}

/// Client transport double: records queued frames, holds transmit-completion
/// hooks until the test releases them, and dispatches delivered frames
/// through the installed filters.
#[derive(Default)]
pub struct MockClient {
    state: Mutex<ClientState>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs an arriving frame through the filters, like the transport does
    /// before normal dispatch. Returns `true` if a filter consumed it.
    pub fn deliver(&self, frame: Frame) -> bool {
        // Snapshot so filters run without the registry lock held; a filter
        // may re-enter `remove_filter`.
        let filters: Vec<Arc<dyn FrameFilter>> = self
            .state
            .lock()
            .filters
            .iter()
            .map(|(_, filter)| Arc::clone(filter))
            .collect();

        let mut frame = frame;
        for filter in filters {
            match filter.filter(frame) {
                FilterVerdict::Consumed => return true,
                FilterVerdict::Declined(declined) => frame = declined,
                FilterVerdict::Fatal(_) => {
                    self.immediate_close();
                    return true;
                }
            }
        }
        false
    }

    /// Frames queued so far, oldest first; leaves them in place.
    pub fn sent(&self) -> Vec<Frame> {
        self.state.lock().sent.clone()
    }

    /// Drains and returns the queued frames.
    pub fn take_sent(&self) -> Vec<Frame> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Fires the oldest pending transmit-completion hook. Returns `false`
    /// when none is pending.
    pub fn complete_next_transmit(&self) -> bool {
        let completion = self.state.lock().completions.pop_front();
        match completion {
            Some(completion) => {
                completion();
                true
            }
            None => false,
        }
    }

    pub fn pending_completions(&self) -> usize {
        self.state.lock().completions.len()
    }

    pub fn filter_count(&self) -> usize {
        self.state.lock().filters.len()
    }

    pub fn set_reject_filters(&self, reject: bool) {
        self.state.lock().reject_filters = reject;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    pub fn was_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn was_immediately_closed(&self) -> bool {
        self.state.lock().immediately_closed
    }
}

impl RpcClient for MockClient {
    fn add_filter(&self, filter: Box<dyn FrameFilter>) -> Result<FilterId, FilterRejected> {
        let mut state = self.state.lock();
        if state.reject_filters {
            return Err(FilterRejected);
        }
        let id = state.next_filter_id;
        state.next_filter_id += 1;
        state.filters.push((id, Arc::from(filter)));
        Ok(id)
    }

    fn remove_filter(&self, id: FilterId) {
        self.state.lock().filters.retain(|(filter_id, _)| *filter_id != id);
    }

    fn send_frame(&self, frame: OutboundFrame) -> Result<(), SendFrameError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(SendFrameError);
        }
        state.sent.push(frame.frame);
        if let Some(completion) = frame.completion {
            state.completions.push_back(completion);
        }
        Ok(())
    }

    fn immediate_close(&self) {
        let mut state = self.state.lock();
        state.immediately_closed = true;
        state.closed = true;
    }

    fn close(&self) {
        self.state.lock().closed = true;
    }
}

// ---------------------- //

/// One scripted outcome of a `send` on the mock data sink.
pub enum SinkScript {
    /// Absorb the whole buffer.
    Accept,
    /// Absorb at most `n` bytes.
    AcceptPartial(usize),
    WouldBlock,
    Fail(&'static str),
}

/// One scripted outcome of a `recv` on the mock data source.
pub enum SourceScript {
    Data(Vec<u8>),
    Eof,
    WouldBlock,
    Fail(&'static str),
}

struct DataState {
    sink_script: VecDeque<SinkScript>,
    source_script: VecDeque<SourceScript>,
    written: Vec<u8>,
    interest: StreamEvents,
    callback: Option<Arc<Mutex<EventCallback>>>,
    aborted: bool,
    finished: bool,
    finish_failure: Option<&'static str>,
    refuse_callback: bool,
    recv_calls: usize,
}

impl Default for DataState {
    fn default() -> Self {
        Self {
            sink_script: VecDeque::new(),
            source_script: VecDeque::new(),
            written: Vec::new(),
            interest: StreamEvents::empty(),
            callback: None,
            aborted: false,
            finished: false,
            finish_failure: None,
            refuse_callback: false,
            recv_calls: 0,
        }
    }
}

/// Test-side view of a mock data object; the engine owns the object itself.
pub struct DataShared {
    state: Mutex<DataState>,
}

impl DataShared {
    /// Fires `events` at the engine, like the event layer's I/O thread.
    /// Panics if no callback is installed.
    pub fn fire(&self, events: StreamEvents) {
        let callback = self
            .state
            .lock()
            .callback
            .as_ref()
            .map(Arc::clone)
            .expect("no event callback installed");
        (*callback.lock())(events);
    }

    pub fn has_callback(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    pub fn interest(&self) -> StreamEvents {
        self.state.lock().interest
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn aborted(&self) -> bool {
        self.state.lock().aborted
    }

    pub fn finished(&self) -> bool {
        self.state.lock().finished
    }

    pub fn recv_calls(&self) -> usize {
        self.state.lock().recv_calls
    }

    pub fn push_sink(&self, script: SinkScript) {
        self.state.lock().sink_script.push_back(script);
    }

    pub fn push_source(&self, script: SourceScript) {
        self.state.lock().source_script.push_back(script);
    }

    pub fn fail_finish(&self, message: &'static str) {
        self.state.lock().finish_failure = Some(message);
    }

    pub fn refuse_callback(&self) {
        self.state.lock().refuse_callback = true;
    }
}

/// The engine-owned half: scripted sink/source with default behaviors of
/// "absorb everything" and "would block".
pub struct MockData {
    shared: Arc<DataShared>,
}

impl MockData {
    pub fn new() -> (Box<Self>, Arc<DataShared>) {
        let shared = Arc::new(DataShared {
            state: Mutex::new(DataState::default()),
        });
        (
            Box::new(Self {
                shared: Arc::clone(&shared),
            }),
            shared,
        )
    }
}

impl DataObject for MockData {
    fn send(&mut self, buf: &[u8]) -> Result<DataIo, DataObjectError> {
        let mut state = self.shared.state.lock();
        match state.sink_script.pop_front().unwrap_or(SinkScript::Accept) {
            SinkScript::Accept => {
                state.written.extend_from_slice(buf);
                Ok(DataIo::Progress(buf.len()))
            }
            SinkScript::AcceptPartial(n) => {
                let n = n.min(buf.len());
                state.written.extend_from_slice(&buf[..n]);
                Ok(DataIo::Progress(n))
            }
            SinkScript::WouldBlock => Ok(DataIo::WouldBlock),
            SinkScript::Fail(message) => Err(DataObjectError::new(message)),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<DataIo, DataObjectError> {
        let mut state = self.shared.state.lock();
        state.recv_calls += 1;
        match state.source_script.pop_front().unwrap_or(SourceScript::WouldBlock) {
            SourceScript::Data(bytes) => {
                assert!(bytes.len() <= buf.len(), "scripted chunk larger than offered buffer");
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(DataIo::Progress(bytes.len()))
            }
            SourceScript::Eof => Ok(DataIo::Progress(0)),
            SourceScript::WouldBlock => Ok(DataIo::WouldBlock),
            SourceScript::Fail(message) => Err(DataObjectError::new(message)),
        }
    }

    fn finish(&mut self) -> Result<(), DataObjectError> {
        let mut state = self.shared.state.lock();
        state.finished = true;
        match state.finish_failure {
            Some(message) => Err(DataObjectError::new(message)),
            None => Ok(()),
        }
    }

    fn abort(&mut self) {
        self.shared.state.lock().aborted = true;
    }

    fn event_add_callback(&mut self, interest: StreamEvents, callback: EventCallback) -> Result<(), DataObjectError> {
        let mut state = self.shared.state.lock();
        if state.refuse_callback {
            return Err(DataObjectError::new("event layer refused the callback"));
        }
        state.interest = interest;
        state.callback = Some(Arc::new(Mutex::new(callback)));
        Ok(())
    }

    fn event_update_callback(&mut self, interest: StreamEvents) {
        self.shared.state.lock().interest = interest;
    }

    fn event_remove_callback(&mut self) {
        let mut state = self.shared.state.lock();
        state.callback = None;
        state.interest = StreamEvents::empty();
    }
}

// ---------------------- //

/// Everything a test needs to drive one registered stream.
pub struct Rig {
    pub client: Arc<MockClient>,
    pub data: Arc<DataShared>,
    pub set: Arc<StreamSet>,
    pub handle: Arc<StreamHandle>,
}

/// Registers a single mock-backed stream on a fresh client.
pub fn rig(procedure: u32, serial: u32, transmit: bool) -> Rig {
    let client = MockClient::new();
    let (mock, data) = MockData::new();
    let transport: Arc<dyn RpcClient> = client.clone();
    let set = StreamSet::new(transport);
    let program = Arc::new(RpcProgram::new(PROGRAM, VERSION));
    let stream = Stream::new(procedure, serial, program, mock);
    let handle = set.add(stream, transmit).expect("stream registration failed");
    Rig {
        client,
        data,
        set,
        handle,
    }
}

// ---------------------- //

pub fn stream_frame(procedure: u32, serial: u32, status: FrameStatus, payload: &[u8]) -> Frame {
    Frame {
        header: FrameHeader {
            program: PROGRAM,
            version: VERSION,
            procedure,
            kind: FrameKind::Stream,
            serial,
            status,
        },
        payload: Bytes::copy_from_slice(payload),
    }
}

pub fn continue_frame(procedure: u32, serial: u32, payload: &[u8]) -> Frame {
    stream_frame(procedure, serial, FrameStatus::CONTINUE, payload)
}

pub fn ok_frame(procedure: u32, serial: u32) -> Frame {
    stream_frame(procedure, serial, FrameStatus::OK, b"")
}

pub fn error_frame(procedure: u32, serial: u32) -> Frame {
    stream_frame(procedure, serial, FrameStatus::ERROR, b"")
}

pub fn assert_credit_reply(frame: &Frame, serial: u32) {
    assert_eq!(FrameKind::Reply, frame.header.kind);
    assert_eq!(FrameStatus::OK, frame.header.status);
    assert_eq!(serial, frame.header.serial);
    assert!(frame.payload.is_empty());
}

pub fn assert_reply_error(frame: &Frame, serial: u32, message: &str) {
    assert_eq!(FrameKind::Reply, frame.header.kind);
    assert_eq!(FrameStatus::ERROR, frame.header.status);
    assert_eq!(serial, frame.header.serial);
    assert_eq!(message.as_bytes(), &frame.payload);
}

pub fn assert_stream_data(frame: &Frame, serial: u32, payload: &[u8]) {
    assert_eq!(FrameKind::Stream, frame.header.kind);
    assert_eq!(FrameStatus::CONTINUE, frame.header.status);
    assert_eq!(serial, frame.header.serial);
    assert_eq!(payload, &frame.payload);
}

pub fn assert_stream_finished(frame: &Frame, serial: u32) {
    assert_eq!(FrameKind::Stream, frame.header.kind);
    assert_eq!(FrameStatus::OK, frame.header.status);
    assert_eq!(serial, frame.header.serial);
    assert!(frame.payload.is_empty());
}

pub fn assert_stream_error(frame: &Frame, serial: u32, message: &str) {
    assert_eq!(FrameKind::Stream, frame.header.kind);
    assert_eq!(FrameStatus::ERROR, frame.header.status);
    assert_eq!(serial, frame.header.serial);
    assert_eq!(message.as_bytes(), &frame.payload);
}
