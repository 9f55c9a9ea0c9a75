//! One logical ADB service channel. Grounded on `py_adb.adb_commands.AdbSession`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::codec::{Frame, Tag};
use crate::error::{AdbError, StreamError};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Opening,
    Established,
    Closing,
    Closed,
}

struct Inner {
    state: StreamState,
    remote_id: Option<u32>,
    queue: VecDeque<Vec<u8>>,
}

/// One poll result from [`Stream::recv`]: either a chunk of payload, in
/// arrival order, or an "empty marker" meaning no data is buffered yet but
/// the stream is still open.
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    Empty,
}

/// One open ADB service channel, addressed by a local id the host assigns
/// and a remote id the device assigns once it acks the `OPEN`.
pub struct Stream {
    local_id: u32,
    transport: Arc<Transport>,
    inner: Mutex<Inner>,
    finished: AtomicBool,
}

impl Stream {
    /// Constructs a handle in the `Opening` state without touching the wire.
    /// The caller (`SessionManager`) must register it in the session table
    /// before calling [`Stream::send_open`], so the router can never observe
    /// an `OKAY` for a stream it doesn't know about yet.
    pub(crate) fn new_opening(transport: Arc<Transport>, local_id: u32) -> Arc<Self> {
        Arc::new(Self {
            local_id,
            transport,
            inner: Mutex::new(Inner { state: StreamState::Opening, remote_id: None, queue: VecDeque::new() }),
            finished: AtomicBool::new(false),
        })
    }

    /// Emits `OPEN` for this stream. The caller observes the transition to
    /// `Established` once the router applies a matching `OKAY`.
    pub(crate) fn send_open(&self, service: &[u8]) -> Result<(), AdbError> {
        let mut payload = service.to_vec();
        if !payload.ends_with(&[0]) {
            payload.push(0);
        }
        self.transport.send(&Frame::new(Tag::Open, self.local_id, 0, payload))
    }

    /// Convenience constructor for tests: builds and opens a stream in one call.
    #[cfg(test)]
    pub(crate) fn open(transport: Arc<Transport>, local_id: u32, service: &[u8]) -> Result<Arc<Self>, AdbError> {
        let stream = Self::new_opening(transport, local_id);
        stream.send_open(service)?;
        Ok(stream)
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Applies a device-assigned remote id, completing the open handshake.
    pub(crate) fn register(&self, remote_id: u32) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().expect("stream mutex poisoned");
        if inner.remote_id.is_some() {
            return Err(StreamError::AlreadyRegistered);
        }
        inner.remote_id = Some(remote_id);
        inner.state = StreamState::Established;
        Ok(())
    }

    pub(crate) fn is_opening(&self) -> bool {
        self.inner.lock().expect("stream mutex poisoned").state == StreamState::Opening
    }

    pub(crate) fn is_established(&self) -> bool {
        self.inner.lock().expect("stream mutex poisoned").state == StreamState::Established
    }

    /// Enqueues an inbound `WRTE` payload. The caller (the router) has
    /// already emitted the transport-level `OKAY`.
    pub(crate) fn enqueue(&self, data: Vec<u8>) {
        self.inner.lock().expect("stream mutex poisoned").queue.push_back(data);
    }

    /// Marks the stream finished after a `CLSE` (from either side) or a
    /// fatal link failure.
    pub(crate) fn mark_closed(&self) {
        let mut inner = self.inner.lock().expect("stream mutex poisoned");
        inner.state = StreamState::Closed;
        self.finished.store(true, Ordering::Release);
    }

    /// Non-blocking poll: returns the next buffered chunk in order, an
    /// empty marker if the stream is open but nothing is buffered yet, or
    /// `None` exactly once when the stream is finished and drained.
    pub fn recv(&self) -> Option<Chunk> {
        let mut inner = self.inner.lock().expect("stream mutex poisoned");
        if let Some(data) = inner.queue.pop_front() {
            return Some(Chunk::Data(data));
        }
        if self.is_finished() {
            None
        } else {
            Some(Chunk::Empty)
        }
    }

    /// Sends `data` as one or more `WRTE` frames, each capped at the
    /// transport's negotiated `max_payload`. Does not wait for a device
    /// `OKAY` between chunks (outbound windowing is a higher-layer concern).
    pub fn write(&self, data: &[u8]) -> Result<(), AdbError> {
        let remote_id = self.inner.lock().expect("stream mutex poisoned").remote_id.unwrap_or(0);
        let cap = self.transport.max_payload().max(1) as usize;
        for chunk in data.chunks(cap) {
            self.transport.send(&Frame::new(Tag::Wrte, self.local_id, remote_id, chunk.to_vec()))?;
        }
        Ok(())
    }

    /// Emits `CLSE`. Idempotent: a second call is a no-op.
    pub fn close(&self) -> Result<(), AdbError> {
        let mut inner = self.inner.lock().expect("stream mutex poisoned");
        if inner.state == StreamState::Closing || inner.state == StreamState::Closed {
            return Ok(());
        }
        let remote_id = inner.remote_id.unwrap_or(0);
        inner.state = StreamState::Closing;
        drop(inner);
        debug!("closing stream local_id={}", self.local_id);
        self.transport.send(&Frame::new(Tag::Clse, self.local_id, remote_id, Vec::new()))?;
        self.mark_closed();
        Ok(())
    }
}
