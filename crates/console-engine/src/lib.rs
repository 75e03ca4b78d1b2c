//! Docker Engine API client.
//!
//! Provides:
//! - `DockerEngine` - `Engine` implementation over the engine HTTP API
//! - `DockerDialer` - Opens engines from context descriptors
//! - Stream transport for `tcp://` and `unix://` endpoints

pub mod docker;
pub mod http;
pub mod transport;

pub use docker::{DockerDialer, DockerEngine};
pub use transport::EngineStream;
