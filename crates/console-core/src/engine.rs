//! Narrow backend interface consumed by the registry and the bridge.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::descriptor::ContextDescriptor;

/// Raw bidirectional byte stream.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

/// Byte channel attached to a remote process inside a container.
pub type ProcessStream = Box<dyn RawStream>;

/// Identifier of a created remote process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessId(pub String);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for creating a remote process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Command and arguments to run.
    pub command: Vec<String>,
    /// Allocate a pseudo-terminal.
    pub tty: bool,
    /// Key sequence that detaches from the process.
    pub detach_keys: Option<String>,
}

impl ProcessSpec {
    /// Spec for an interactive shell with a pseudo-terminal.
    #[must_use]
    pub fn interactive_shell() -> Self {
        Self {
            command: vec!["/bin/sh".to_string()],
            tty: true,
            detach_keys: Some("ctrl-p,ctrl-q".to_string()),
        }
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

/// Backend engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("engine returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live backend connection bound to one endpoint address.
///
/// One handle may back many concurrent sessions; all methods take
/// `&self` and are safe to call from multiple tasks.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Create a remote process inside a container.
    async fn create_process(
        &self,
        container_id: &str,
        spec: &ProcessSpec,
    ) -> Result<ProcessId, EngineError>;

    /// Attach to a created process, obtaining its byte stream.
    async fn attach(&self, process: &ProcessId) -> Result<ProcessStream, EngineError>;

    /// Start execution of a created process.
    async fn start(&self, process: &ProcessId) -> Result<(), EngineError>;

    /// Resize the process's pseudo-terminal.
    async fn resize(&self, process: &ProcessId, size: TerminalSize) -> Result<(), EngineError>;

    /// Probe endpoint liveness.
    async fn ping(&self) -> Result<(), EngineError>;
}

/// Opens backend connections for context descriptors.
#[async_trait]
pub trait EngineDialer: Send + Sync {
    /// Open a connection to the descriptor's endpoint.
    async fn dial(&self, descriptor: &ContextDescriptor) -> Result<Arc<dyn Engine>, EngineError>;
}
