use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::sender::StreamShared;
use crate::models::error::StreamError;
use crate::models::state::StreamState;
use crate::traits::stream_delegate::StreamDelegate;

/// Owns the socket for one sender. Runs on the `stream-event-loop` thread,
/// so every state change and delegate callback happens there, in order.
pub(crate) struct EventLoop {
    pub addrs: Vec<SocketAddr>,
    pub header: Option<Vec<u8>>,
    pub connect_timeout: Duration,
    pub close_linger: Duration,
    pub rx: mpsc::Receiver<Vec<u8>>,
    pub cancel: CancellationToken,
    pub shared: Arc<StreamShared>,
    pub delegate: Option<Arc<dyn StreamDelegate>>,
}

/// How a write ended relative to `close_connection()`.
enum Written {
    Done,
    /// Close was requested mid-write; the write finished before `deadline`.
    BeforeDeadline(Instant),
    /// The close linger expired with the write still pending.
    Abandoned,
}

impl EventLoop {
    pub(crate) async fn run(mut self) {
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                log::debug!("Stream closed before the connection opened");
                self.rx.close();
                self.shared.set_state(StreamState::Closed);
                return;
            }
            result = self.connect() => result,
        };

        let mut stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                self.rx.close();
                self.fail(e);
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Failed to set TCP_NODELAY: {}", e);
        }
        self.notify(|d| d.on_connection_opened());

        let mut abandoned = false;
        let mut deadline = None;
        if let Some(header) = self.header.take().filter(|h| !h.is_empty()) {
            match self.write_until_closed(&mut stream, &header).await {
                Ok(Written::Abandoned) => abandoned = true,
                Ok(written) => {
                    if let Written::BeforeDeadline(at) = written {
                        deadline = Some(at);
                    }
                    self.shared.header_sent.store(true, Ordering::SeqCst);
                    log::debug!("Stream header sent ({} bytes)", header.len());
                    self.notify(|d| d.on_header_sent(&header));
                }
                Err(e) => {
                    self.rx.close();
                    self.fail(StreamError::HeaderSendFailed(e.to_string()));
                    return;
                }
            }
        }
        if !abandoned {
            self.shared.set_state(StreamState::Open);
            log::info!("Stream open");
        }

        while !abandoned && deadline.is_none() {
            let bytes = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                payload = self.rx.recv() => match payload {
                    Some(bytes) => bytes,
                    None => break,
                },
            };
            match self.write_until_closed(&mut stream, &bytes).await {
                Ok(Written::Done) => self.record_written(&bytes),
                Ok(Written::BeforeDeadline(at)) => {
                    self.record_written(&bytes);
                    deadline = Some(at);
                }
                Ok(Written::Abandoned) => abandoned = true,
                Err(e) => {
                    self.rx.close();
                    self.fail(StreamError::BytesSendFailed(e.to_string()));
                    let _ = stream.shutdown().await;
                    self.notify(|d| d.on_connection_closed());
                    return;
                }
            }
        }

        self.rx.close();
        if abandoned {
            log::warn!("Close linger expired mid-write, dropping the connection");
        } else {
            let deadline = deadline.unwrap_or_else(|| Instant::now() + self.close_linger);
            self.drain(&mut stream, deadline).await;
            if let Err(e) = stream.shutdown().await {
                log::debug!("Stream shutdown: {}", e);
            }
        }
        drop(stream);
        self.shared.set_state(StreamState::Closed);
        log::info!(
            "Stream closed after {} bytes",
            self.shared.bytes_written.load(Ordering::SeqCst)
        );
        self.notify(|d| d.on_connection_closed());
    }

    /// Try each resolved address in turn within the connect timeout.
    async fn connect(&self) -> Result<TcpStream, StreamError> {
        let mut last_error = String::from("no addresses to connect to");
        for addr in &self.addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    log::debug!("Connected to {}", addr);
                    return Ok(stream);
                }
                Ok(Err(e)) => last_error = format!("{}: {}", addr, e),
                Err(_) => {
                    last_error = format!("{}: timed out after {:?}", addr, self.connect_timeout)
                }
            }
        }
        Err(StreamError::ConnectionOpenFailed(last_error))
    }

    /// Write `bytes`, giving up once a close has waited out the linger.
    ///
    /// A peer that stops reading leaves `write_all` pending forever, so the
    /// write races the cancel token.
    async fn write_until_closed(&self, stream: &mut TcpStream, bytes: &[u8]) -> io::Result<Written> {
        let write = stream.write_all(bytes);
        tokio::pin!(write);
        tokio::select! {
            biased;
            result = &mut write => result.map(|()| Written::Done),
            _ = self.cancel.cancelled() => {
                let deadline = Instant::now() + self.close_linger;
                match tokio::time::timeout_at(deadline, write).await {
                    Ok(result) => result.map(|()| Written::BeforeDeadline(deadline)),
                    Err(_) => Ok(Written::Abandoned),
                }
            }
        }
    }

    fn record_written(&self, bytes: &[u8]) {
        self.shared
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::SeqCst);
        self.notify(|d| d.on_bytes_written(bytes));
    }

    /// Write payloads queued before close, giving up at `deadline`.
    async fn drain(&mut self, stream: &mut TcpStream, deadline: Instant) {
        let mut pending = Vec::new();
        while let Ok(bytes) = self.rx.try_recv() {
            pending.push(bytes);
        }
        if pending.is_empty() {
            return;
        }

        let total = pending.len();
        let flushed = tokio::time::timeout_at(deadline, async {
            for bytes in &pending {
                stream.write_all(bytes).await?;
                self.record_written(bytes);
            }
            Ok::<(), io::Error>(())
        })
        .await;
        match flushed {
            Ok(Ok(())) => log::debug!("Flushed {} queued payloads on close", total),
            Ok(Err(e)) => log::warn!("Dropped queued payloads on close: {}", e),
            Err(_) => log::warn!("Close linger expired with payloads still queued"),
        }
    }

    fn fail(&self, error: StreamError) {
        log::error!("Stream failed: {}", error);
        self.shared.record_failure(error.clone());
        self.notify(|d| d.on_error(&error));
    }

    fn notify(&self, event: impl FnOnce(&dyn StreamDelegate)) {
        if let Some(delegate) = self.delegate.as_deref() {
            event(delegate);
        }
    }
}
