//! Frame-oriented view of the operator connection.
//!
//! The pumps are written against these two seams so session logic can
//! be driven by in-memory fakes in tests; `ws` adapts an axum
//! WebSocket onto them.

use async_trait::async_trait;

/// Frame arriving from the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InFrame {
    /// Structured text frame, candidate control frame.
    Text(String),
    /// Any other frame kind; ignored by the bridge.
    Other,
}

/// Frame sent to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutFrame {
    /// Raw process output, no envelope.
    Binary(Vec<u8>),
    /// Human-readable diagnostic, used during session setup.
    Text(String),
}

/// Sending half of the operator connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame. An error means the connection is gone.
    async fn send(&mut self, frame: OutFrame) -> std::io::Result<()>;

    /// Best-effort close handshake; closing twice is a no-op.
    async fn close(&mut self);
}

/// Receiving half of the operator connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` on close handshake or connection loss.
    async fn next(&mut self) -> Option<InFrame>;
}
