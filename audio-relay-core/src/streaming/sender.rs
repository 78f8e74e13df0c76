use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::event_loop::EventLoop;
use crate::models::config::{RecordingConfiguration, RemoteDestination};
use crate::models::error::StreamError;
use crate::models::state::StreamState;
use crate::traits::stream_delegate::StreamDelegate;

/// Tuning for one stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Payloads held for the socket before `send` reports `StreamBlocked`.
    pub queue_depth: usize,
    pub connect_timeout: Duration,
    pub close_linger: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::from(&RecordingConfiguration::default())
    }
}

impl From<&RecordingConfiguration> for StreamOptions {
    fn from(config: &RecordingConfiguration) -> Self {
        Self {
            queue_depth: config.stream_queue_depth.max(1),
            connect_timeout: config.connect_timeout(),
            close_linger: config.close_linger(),
        }
    }
}

/// State shared between the sender handle and its event loop.
#[derive(Debug)]
pub(crate) struct StreamShared {
    state: Mutex<StreamState>,
    pub header_sent: AtomicBool,
    pub bytes_written: AtomicU64,
    failure: Mutex<Option<StreamError>>,
}

impl StreamShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(StreamState::Idle),
            header_sent: AtomicBool::new(false),
            bytes_written: AtomicU64::new(0),
            failure: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: StreamState) {
        let mut current = self.state.lock();
        if !current.is_terminal() {
            *current = state;
        }
    }

    pub fn record_failure(&self, error: StreamError) {
        self.failure.lock().get_or_insert(error);
        self.set_state(StreamState::Closed);
    }
}

struct Connection {
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
    handle: Option<thread::JoinHandle<()>>,
}

/// One outbound byte-stream connection to `host:port`.
///
/// The header, when set, goes out exactly once, ahead of the first payload.
/// Payloads are raw bytes with no framing.
///
/// ```text
/// send() ──try_send──→ [bounded queue] ──→ stream-event-loop ──write_all──→ socket
///          Full → StreamBlocked
/// ```
///
/// `send` never waits for the socket. All delegate callbacks run on the
/// event-loop thread.
pub struct StreamSender {
    destination: RemoteDestination,
    header: Option<Vec<u8>>,
    options: StreamOptions,
    delegate: Option<Arc<dyn StreamDelegate>>,
    shared: Arc<StreamShared>,
    connection: Mutex<Option<Connection>>,
}

impl StreamSender {
    pub fn new(destination: RemoteDestination, header: Option<Vec<u8>>, options: StreamOptions) -> Self {
        Self {
            destination,
            header,
            options,
            delegate: None,
            shared: Arc::new(StreamShared::new()),
            connection: Mutex::new(None),
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn StreamDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Resolve the host and start connecting on the event-loop thread.
    ///
    /// Returns once the connection attempt is scheduled. Connect and header
    /// failures arrive later through the delegate and move the sender to
    /// `Closed`. Every error here is fatal for this instance.
    pub fn prepare_for_sending(&self) -> Result<(), StreamError> {
        let mut connection = self.connection.lock();
        match self.shared.state() {
            StreamState::Idle => {}
            StreamState::Preparing | StreamState::Open => return Ok(()),
            StreamState::Closed => return Err(StreamError::NotOpen),
        }

        let addrs = self.resolve().map_err(|e| self.fail_early(e))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| self.fail_early(StreamError::RunLoopSchedulingFailed(e.to_string())))?;

        let (tx, rx) = mpsc::channel(self.options.queue_depth.max(1));
        let cancel = CancellationToken::new();
        let event_loop = EventLoop {
            addrs,
            header: self.header.clone(),
            connect_timeout: self.options.connect_timeout,
            close_linger: self.options.close_linger,
            rx,
            cancel: cancel.clone(),
            shared: Arc::clone(&self.shared),
            delegate: self.delegate.clone(),
        };

        self.shared.set_state(StreamState::Preparing);
        let handle = thread::Builder::new()
            .name("stream-event-loop".into())
            .spawn(move || runtime.block_on(event_loop.run()))
            .map_err(|e| self.fail_early(StreamError::CallbackRegistrationFailed(e.to_string())))?;

        log::info!("Stream connecting to {}", self.destination);
        *connection = Some(Connection {
            tx,
            cancel,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Queue `bytes` for the socket. Copies before returning.
    ///
    /// `StreamBlocked` means the queue is full and the bytes were not taken;
    /// the caller decides whether to drop or retry them.
    pub fn send(&self, bytes: &[u8]) -> Result<(), StreamError> {
        let connection = self.connection.lock();
        let Some(connection) = connection.as_ref() else {
            return Err(self.closed_error());
        };
        if !self.shared.state().accepts_payloads() {
            return Err(self.closed_error());
        }

        match connection.tx.try_send(bytes.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(StreamError::StreamBlocked),
            Err(TrySendError::Closed(_)) => Err(self.closed_error()),
        }
    }

    /// Tear down the connection. Idempotent.
    ///
    /// Payloads already queued get up to the close linger to reach the socket.
    pub fn close_connection(&self) {
        let connection = self.connection.lock().take();
        let Some(mut connection) = connection else {
            self.shared.set_state(StreamState::Closed);
            return;
        };

        connection.cancel.cancel();
        drop(connection.tx);
        if let Some(handle) = connection.handle.take() {
            // A delegate closing from its own callback cannot join itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("Stream event loop panicked");
            }
        }
        self.shared.set_state(StreamState::Closed);
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn header_sent(&self) -> bool {
        self.shared.header_sent.load(Ordering::SeqCst)
    }

    /// Payload bytes written to the socket, excluding the header.
    pub fn bytes_written(&self) -> u64 {
        self.shared.bytes_written.load(Ordering::SeqCst)
    }

    /// The fatal error that closed this sender, if any.
    pub fn failure(&self) -> Option<StreamError> {
        self.shared.failure.lock().clone()
    }

    pub fn destination(&self) -> &RemoteDestination {
        &self.destination
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, StreamError> {
        let addrs: Vec<SocketAddr> = (self.destination.host.as_str(), self.destination.port)
            .to_socket_addrs()
            .map_err(|e| StreamError::HostUnreachable(format!("{}: {}", self.destination, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(StreamError::HostUnreachable(format!(
                "{}: no addresses found",
                self.destination
            )));
        }
        Ok(addrs)
    }

    fn fail_early(&self, error: StreamError) -> StreamError {
        log::error!("Stream to {} failed: {}", self.destination, error);
        self.shared.record_failure(error.clone());
        error
    }

    fn closed_error(&self) -> StreamError {
        self.failure().unwrap_or(StreamError::NotOpen)
    }
}

impl Drop for StreamSender {
    fn drop(&mut self) {
        self.close_connection();
    }
}
