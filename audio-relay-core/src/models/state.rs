use serde::Serialize;

/// Lifecycle of one capture buffer in the ring.
///
/// ```text
/// Free → Filling → Ready → Draining → Free
/// ```
///
/// `Free` and `Filling` buffers belong to the hardware queue; `Ready` and
/// `Draining` buffers belong to the consumer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferState {
    Free,
    Filling,
    Ready,
    Draining,
}

/// Stream sender state machine.
///
/// ```text
/// idle → preparing → open → closed
///            ↓                 ↑
///            └─────────────────┘
/// ```
///
/// `Closed` is terminal; a new sender is needed to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Preparing,
    Open,
    Closed,
}

impl StreamState {
    /// Payloads handed over while preparing are written once the connection opens.
    pub fn accepts_payloads(&self) -> bool {
        matches!(self, Self::Preparing | Self::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Recording coordinator state.
///
/// ```text
/// idle → prepared → recording
///   ↑        │          │
///   └────────┴── stop ──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Prepared,
    Recording,
}

impl RecorderState {
    /// Configuration is frozen from preparation until stop.
    pub fn is_locked(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}
