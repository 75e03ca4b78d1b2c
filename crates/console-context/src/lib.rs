//! Context descriptor store and engine client registry.
//!
//! Provides:
//! - `ContextStore` - Typed JSON document of named endpoints
//! - `ClientRegistry` - Lazily dialed, cached engine handles per context

pub mod registry;
pub mod store;

pub use registry::{ClientRegistry, RegistryError};
pub use store::{ContextStore, StoreError};
