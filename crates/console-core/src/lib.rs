//! Core abstractions for the container console.
//!
//! This crate provides the fundamental building blocks:
//! - `ContextDescriptor` - Named container-engine endpoint
//! - `EndpointAddr` - Validated transport address
//! - `Engine` / `EngineDialer` traits - Narrow backend interface
//! - `EngineError` - Backend error taxonomy

pub mod descriptor;
pub mod engine;

pub use descriptor::{AddressError, ContextDescriptor, EndpointAddr, TransportKind};
pub use engine::{
    Engine, EngineDialer, EngineError, ProcessId, ProcessSpec, ProcessStream, TerminalSize,
};
