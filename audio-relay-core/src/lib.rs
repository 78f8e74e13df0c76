//! # audio-relay-core
//!
//! Platform-agnostic microphone relay core.
//!
//! Captures input through a fixed ring of buffers and fans each filled
//! buffer out to a local file, a remote byte-stream socket, or both.
//! Platform backends (cpal) implement the `CaptureDevice` trait and plug
//! into the generic `RecordingCoordinator`.
//!
//! ## Architecture
//!
//! ```text
//! audio-relay-core (this crate)
//! ├── traits/       ← CaptureDevice, CaptureConsumer, StreamDelegate, RecorderDelegate
//! ├── models/       ← errors, formats, states, levels, configuration, summaries
//! ├── processing/   ← BufferRing, LevelMeter, PCM conversion
//! ├── capture/      ← CaptureEngine (buffer lifecycle + delivery thread)
//! ├── streaming/    ← StreamSender (header framing, bounded queue, event loop)
//! ├── session/      ← RecordingCoordinator (fan-out, configuration locking)
//! └── storage/      ← FileSink, metadata sidecar
//! ```
//!
//! ## Threads
//!
//! | Thread | Owns |
//! |--------|------|
//! | device callback | ring fill, level metering |
//! | `capture-delivery` | consumer callbacks, file writes, stream hand-off |
//! | `stream-event-loop` | socket, stream state, stream delegate callbacks |

pub mod capture;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod streaming;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use capture::engine::CaptureEngine;
pub use models::config::{RecordingConfiguration, RemoteDestination};
pub use models::error::{CaptureError, ErrorKind, ErrorOrigin, RecorderError, StreamError};
pub use models::format::{AudioFormatDescriptor, CodecTag};
pub use models::levels::{ChannelLevel, LevelMeterState};
pub use models::recording_result::{FileOutcome, RecorderDiagnostics, RecordingSummary, StreamOutcome};
pub use models::state::{BufferState, RecorderState, StreamState};
pub use processing::buffer_ring::BufferRing;
pub use processing::level_meter::LevelMeter;
pub use processing::pcm::PcmConverter;
pub use session::coordinator::{PreparationReport, RecordingCoordinator};
pub use storage::file_sink::FileSink;
pub use streaming::sender::{StreamOptions, StreamSender};
pub use traits::capture_consumer::{CaptureConsumer, CapturedBuffer};
pub use traits::capture_device::{CaptureDevice, DeviceErrorCallback, InputCallback};
pub use traits::recorder_delegate::RecorderDelegate;
pub use traits::stream_delegate::StreamDelegate;
