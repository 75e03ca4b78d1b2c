//! Interactive shell session bridge.
//!
//! Provides:
//! - `ControlFrame` - Inbound operator control protocol
//! - `FrameSink` / `FrameSource` - Frame-oriented operator connection seams
//! - `run_session` / `relay` - The session state machine and relay pumps
//! - Axum WebSocket adapter and router (`ws`)

pub mod frames;
pub mod protocol;
pub mod session;
pub mod ws;

pub use frames::{FrameSink, FrameSource, InFrame, OutFrame};
pub use protocol::ControlFrame;
pub use session::{BridgeError, TerminationCause, run_session};
pub use ws::router;
