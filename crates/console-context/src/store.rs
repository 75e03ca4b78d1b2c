//! Persistent store for context descriptors.
//!
//! Descriptors live in a single JSON document that is read fully and
//! rewritten fully on each mutation. Replacement is atomic (write to a
//! sibling temp file, then rename) so the document is never partially
//! written. Documents that fail to decode are rejected as configuration
//! errors rather than defaulted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use console_core::{AddressError, ContextDescriptor, TransportKind};

/// Store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("context {0:?} not found")]
    NotFound(String),
    #[error("context {0:?} already exists")]
    AlreadyExists(String),
    #[error("cannot delete current context {0:?}")]
    InUse(String),
    #[error("invalid context configuration: {0}")]
    Config(String),
    #[error("invalid endpoint address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk entry for one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Entry {
    #[serde(rename = "type")]
    transport: TransportKind,
    host: String,
}

/// On-disk document shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    contexts: BTreeMap<String, Entry>,
    #[serde(rename = "current-context", default)]
    current_context: String,
}

impl Document {
    fn descriptor(&self, name: &str, entry: &Entry) -> ContextDescriptor {
        ContextDescriptor {
            name: name.to_string(),
            transport: entry.transport,
            host: entry.host.clone(),
            current: name == self.current_context,
        }
    }
}

/// Context descriptor store backed by a JSON file.
///
/// Pure data access; callers serialize concurrent mutations themselves
/// (the registry does).
pub struct ContextStore {
    path: PathBuf,
}

impl ContextStore {
    /// Create a store backed by the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default document location under the user's home directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".container-console")
            .join("contexts.json")
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List all descriptors, current context first, remainder sorted by name.
    ///
    /// # Errors
    /// Returns an error if the document cannot be read or decoded.
    pub fn list(&self) -> Result<Vec<ContextDescriptor>, StoreError> {
        let doc = self.load()?;
        let mut current = None;
        let mut rest = Vec::new();
        for (name, entry) in &doc.contexts {
            let descriptor = doc.descriptor(name, entry);
            if descriptor.current {
                current = Some(descriptor);
            } else {
                rest.push(descriptor);
            }
        }
        let mut out = Vec::with_capacity(rest.len() + 1);
        out.extend(current);
        out.extend(rest);
        Ok(out)
    }

    /// Get one descriptor by name.
    ///
    /// # Errors
    /// Returns `NotFound` if no such context exists.
    pub fn get(&self, name: &str) -> Result<ContextDescriptor, StoreError> {
        let doc = self.load()?;
        doc.contexts
            .get(name)
            .map(|entry| doc.descriptor(name, entry))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Create a new context.
    ///
    /// # Errors
    /// Returns `AlreadyExists` if the name is taken, or an address error
    /// if the descriptor's host is malformed.
    pub fn create(&self, descriptor: &ContextDescriptor) -> Result<(), StoreError> {
        descriptor.address()?;
        let mut doc = self.load()?;
        if doc.contexts.contains_key(&descriptor.name) {
            return Err(StoreError::AlreadyExists(descriptor.name.clone()));
        }
        doc.contexts.insert(
            descriptor.name.clone(),
            Entry {
                transport: descriptor.transport,
                host: descriptor.host.clone(),
            },
        );
        self.persist(&doc)
    }

    /// Replace the entry for `name` with the given descriptor.
    ///
    /// # Errors
    /// Returns `NotFound` if no such context exists, or an address error
    /// if the new host is malformed.
    pub fn update(&self, name: &str, descriptor: &ContextDescriptor) -> Result<(), StoreError> {
        descriptor.address()?;
        let mut doc = self.load()?;
        let entry = doc
            .contexts
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        entry.transport = descriptor.transport;
        entry.host = descriptor.host.clone();
        self.persist(&doc)
    }

    /// Delete a context.
    ///
    /// # Errors
    /// Returns `InUse` for the current context and `NotFound` for an
    /// unknown one.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut doc = self.load()?;
        if doc.current_context == name {
            return Err(StoreError::InUse(name.to_string()));
        }
        if doc.contexts.remove(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.persist(&doc)
    }

    /// The current context, if one is set.
    ///
    /// # Errors
    /// Returns an error if the document cannot be read or decoded.
    pub fn current(&self) -> Result<Option<ContextDescriptor>, StoreError> {
        let doc = self.load()?;
        Ok(doc
            .contexts
            .get(&doc.current_context)
            .map(|entry| doc.descriptor(&doc.current_context, entry)))
    }

    /// Whether `name` is the current context.
    ///
    /// # Errors
    /// Returns an error if the document cannot be read or decoded.
    pub fn is_current(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.load()?.current_context == name)
    }

    /// Mark `name` as the current context.
    ///
    /// # Errors
    /// Returns `NotFound` if no such context exists.
    pub fn set_current(&self, name: &str) -> Result<(), StoreError> {
        let mut doc = self.load()?;
        if !doc.contexts.contains_key(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        doc.current_context = name.to_string();
        self.persist(&doc)
    }

    fn load(&self) -> Result<Document, StoreError> {
        if !self.path.exists() {
            let doc = Document::default();
            self.persist(&doc)?;
            return Ok(doc);
        }
        let data = fs::read_to_string(&self.path)?;
        serde_json::from_str(&data).map_err(|e| {
            StoreError::Config(format!("{}: {e}", self.path.display()))
        })
    }

    fn persist(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(doc)
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
