use serde::Serialize;
use thiserror::Error;

/// Errors originating from the capture side: the hardware queue, the buffer
/// ring, level metering, and the local file sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("failed to enable level metering: {0}")]
    MeteringEnableFailed(String),

    #[error("failed to allocate capture buffers: {0}")]
    BufferAllocationFailed(String),

    #[error("failed to enqueue capture buffer: {0}")]
    BufferEnqueueFailed(String),

    #[error("failed to create audio file: {0}")]
    AudioFileCreateFailed(String),

    #[error("failed to write audio file: {0}")]
    AudioFileWriteFailed(String),

    #[error("failed to read recording metadata: {0}")]
    MetadataReadFailed(String),

    #[error("failed to open capture queue: {0}")]
    QueueOpenFailed(String),

    #[error("failed to query audio level: {0}")]
    LevelQueryFailed(String),

    #[error("capture device lost: {0}")]
    DeviceLost(String),

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("capture engine is not prepared")]
    NotPrepared,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MeteringEnableFailed(_) => ErrorKind::MeteringEnableFailed,
            Self::BufferAllocationFailed(_) => ErrorKind::BufferAllocationFailed,
            Self::BufferEnqueueFailed(_) => ErrorKind::BufferEnqueueFailed,
            Self::AudioFileCreateFailed(_) => ErrorKind::AudioFileCreateFailed,
            Self::AudioFileWriteFailed(_) => ErrorKind::AudioFileWriteFailed,
            Self::MetadataReadFailed(_) => ErrorKind::MetadataReadFailed,
            Self::QueueOpenFailed(_) => ErrorKind::QueueOpenFailed,
            Self::LevelQueryFailed(_) => ErrorKind::LevelQueryFailed,
            Self::DeviceLost(_) => ErrorKind::DeviceLost,
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::NotPrepared => ErrorKind::NotPrepared,
        }
    }

    /// Fatal errors end the capture session; the rest degrade it.
    ///
    /// File sink failures are fatal only to the file sink, never to capture.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BufferAllocationFailed(_)
                | Self::QueueOpenFailed(_)
                | Self::DeviceLost(_)
                | Self::InvalidFormat(_)
                | Self::NotPrepared
        )
    }
}

/// Errors originating from the outbound stream connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("host unreachable: {0}")]
    HostUnreachable(String),

    #[error("failed to open connection: {0}")]
    ConnectionOpenFailed(String),

    #[error("stream is blocked from accepting bytes")]
    StreamBlocked,

    #[error("failed to send header: {0}")]
    HeaderSendFailed(String),

    #[error("failed to send bytes: {0}")]
    BytesSendFailed(String),

    #[error("failed to schedule stream event loop: {0}")]
    RunLoopSchedulingFailed(String),

    #[error("failed to register stream callbacks: {0}")]
    CallbackRegistrationFailed(String),

    #[error("stream connection is not open")]
    NotOpen,
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HostUnreachable(_) => ErrorKind::HostUnreachable,
            Self::ConnectionOpenFailed(_) => ErrorKind::ConnectionOpenFailed,
            Self::StreamBlocked => ErrorKind::StreamBlocked,
            Self::HeaderSendFailed(_) => ErrorKind::HeaderSendFailed,
            Self::BytesSendFailed(_) => ErrorKind::BytesSendFailed,
            Self::RunLoopSchedulingFailed(_) => ErrorKind::RunLoopSchedulingFailed,
            Self::CallbackRegistrationFailed(_) => ErrorKind::CallbackRegistrationFailed,
            Self::NotOpen => ErrorKind::NotOpen,
        }
    }

    /// Fatal errors close the sender instance; a new one is needed to retry.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::StreamBlocked | Self::NotOpen)
    }
}

/// Errors reported by the recording coordinator and its delegate channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("configuration is locked while a session is prepared")]
    ConfigurationLocked,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl RecorderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Capture(e) => e.kind(),
            Self::Stream(e) => e.kind(),
            Self::ConfigurationLocked => ErrorKind::ConfigurationLocked,
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
        }
    }

    pub fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Capture(_) => ErrorOrigin::Capture,
            Self::Stream(_) => ErrorOrigin::Stream,
            Self::ConfigurationLocked | Self::InvalidConfiguration(_) => ErrorOrigin::Recorder,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    Capture,
    Stream,
    Recorder,
}

/// Stable, machine-readable error identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MeteringEnableFailed,
    BufferAllocationFailed,
    BufferEnqueueFailed,
    AudioFileCreateFailed,
    AudioFileWriteFailed,
    MetadataReadFailed,
    QueueOpenFailed,
    LevelQueryFailed,
    DeviceLost,
    InvalidFormat,
    NotPrepared,
    HostUnreachable,
    ConnectionOpenFailed,
    StreamBlocked,
    HeaderSendFailed,
    BytesSendFailed,
    RunLoopSchedulingFailed,
    CallbackRegistrationFailed,
    NotOpen,
    ConfigurationLocked,
    InvalidConfiguration,
}
