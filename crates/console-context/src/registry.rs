//! Registry of live engine handles, one per context name.
//!
//! Handles are dialed lazily on first use and cached. Invalidation
//! replaces the map entry rather than mutating the handle, so sessions
//! already holding an `Arc` keep their connection until they finish.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};

use console_core::{ContextDescriptor, Engine, EngineDialer, EngineError};

use crate::store::{ContextStore, StoreError};

/// Registry error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

type HandleCell = Arc<OnceCell<Arc<dyn Engine>>>;

/// Maps context names to live engine handles.
///
/// Creation is serialized per name: concurrent callers racing on an
/// unseen context observe exactly one dial, and all of them receive the
/// winner's handle. Distinct names dial concurrently; the outer lock
/// only guards map access, never the dial itself.
pub struct ClientRegistry<D> {
    store: ContextStore,
    dialer: D,
    handles: Mutex<HashMap<String, HandleCell>>,
}

impl<D: EngineDialer> ClientRegistry<D> {
    /// Create a registry over a store and a dialer.
    #[must_use]
    pub fn new(store: ContextStore, dialer: D) -> Self {
        Self {
            store,
            dialer,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying descriptor store.
    #[must_use]
    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Get the engine handle for a context, dialing it on first use.
    ///
    /// A failed dial leaves the context retryable; the error never
    /// poisons the registry.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown context, an address error for a
    /// malformed host, or the dial failure.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Engine>, RegistryError> {
        let cell = {
            let mut handles = self.handles.lock().await;
            Arc::clone(handles.entry(name.to_string()).or_default())
        };
        let result = cell
            .get_or_try_init(|| async {
                let descriptor = self.store.get(name)?;
                descriptor.address().map_err(StoreError::from)?;
                tracing::debug!(context = name, host = %descriptor.host, "dialing engine");
                self.dialer
                    .dial(&descriptor)
                    .await
                    .map_err(RegistryError::from)
            })
            .await;
        match result {
            Ok(engine) => Ok(Arc::clone(engine)),
            Err(e) => {
                // Drop the placeholder entry so failed lookups on
                // arbitrary names cannot grow the map.
                let mut handles = self.handles.lock().await;
                if handles
                    .get(name)
                    .is_some_and(|current| Arc::ptr_eq(current, &cell) && current.get().is_none())
                {
                    handles.remove(name);
                }
                Err(e)
            }
        }
    }

    /// Discard the cached handle for `name`, if any.
    ///
    /// Other contexts are unaffected; a later `get` redials from the
    /// descriptor current at that point.
    pub async fn invalidate(&self, name: &str) {
        if self.handles.lock().await.remove(name).is_some() {
            tracing::debug!(context = name, "discarded cached engine handle");
        }
    }

    /// Create a new context descriptor.
    ///
    /// # Errors
    /// Returns an error if the name is taken or the host is malformed.
    pub fn create(&self, descriptor: &ContextDescriptor) -> Result<(), RegistryError> {
        self.store.create(descriptor)?;
        Ok(())
    }

    /// Update a context descriptor.
    ///
    /// The descriptor is persisted before any handle work. The edited
    /// context's cached handle is always discarded; the current context
    /// is additionally redialed eagerly so a dead endpoint is reported
    /// here instead of to the next session.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown context, an address error for a
    /// malformed host, or the eager redial failure.
    pub async fn update(
        &self,
        name: &str,
        descriptor: &ContextDescriptor,
    ) -> Result<(), RegistryError> {
        self.store.update(name, descriptor)?;
        self.invalidate(name).await;
        if self.store.is_current(name)? {
            self.get(name).await?;
        }
        Ok(())
    }

    /// Delete a context and its cached handle.
    ///
    /// # Errors
    /// Returns `InUse` for the current context and `NotFound` for an
    /// unknown one.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        self.store.delete(name)?;
        self.invalidate(name).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use console_core::{ProcessId, ProcessSpec, ProcessStream, TerminalSize, TransportKind};

    use super::*;

    struct FakeEngine;

    #[async_trait]
    impl Engine for FakeEngine {
        async fn create_process(
            &self,
            _container_id: &str,
            _spec: &ProcessSpec,
        ) -> Result<ProcessId, EngineError> {
            Ok(ProcessId("fake".to_string()))
        }

        async fn attach(&self, _process: &ProcessId) -> Result<ProcessStream, EngineError> {
            let (near, _far) = tokio::io::duplex(64);
            Ok(Box::new(near))
        }

        async fn start(&self, _process: &ProcessId) -> Result<(), EngineError> {
            Ok(())
        }

        async fn resize(
            &self,
            _process: &ProcessId,
            _size: TerminalSize,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn ping(&self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct FakeDialer {
        dials: AtomicUsize,
        fail: bool,
    }

    impl FakeDialer {
        fn new() -> Self {
            Self {
                dials: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                dials: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl EngineDialer for FakeDialer {
        async fn dial(
            &self,
            descriptor: &ContextDescriptor,
        ) -> Result<Arc<dyn Engine>, EngineError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            // Widen the race window for the concurrent-get test.
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail {
                return Err(EngineError::Unreachable(descriptor.host.clone()));
            }
            Ok(Arc::new(FakeEngine))
        }
    }

    fn registry(dialer: FakeDialer) -> (tempfile::TempDir, Arc<ClientRegistry<FakeDialer>>) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path().join("contexts.json"));
        (dir, Arc::new(ClientRegistry::new(store, dialer)))
    }

    fn tcp(name: &str, host: &str) -> ContextDescriptor {
        ContextDescriptor::new(name, TransportKind::Tcp, host)
    }

    #[tokio::test]
    async fn concurrent_get_dials_once() {
        let (_dir, registry) = registry(FakeDialer::new());
        registry.create(&tcp("prod", "tcp://10.0.0.5:2375")).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move { registry.get("prod").await }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(registry.dialer.dials.load(Ordering::SeqCst), 1);
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle));
        }
    }

    #[tokio::test]
    async fn get_unknown_context_fails() {
        let (_dir, registry) = registry(FakeDialer::new());
        let err = registry.get("ghost").await.err().unwrap();
        assert!(matches!(
            err,
            RegistryError::Store(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_dial_does_not_poison_the_registry() {
        let (_dir, registry) = registry(FakeDialer::failing());
        registry.create(&tcp("prod", "tcp://10.0.0.5:2375")).unwrap();

        let err = registry.get("prod").await.err().unwrap();
        assert!(matches!(
            err,
            RegistryError::Engine(EngineError::Unreachable(_))
        ));
        // A later get retries the dial instead of replaying the failure.
        let _ = registry.get("prod").await.err().unwrap();
        assert_eq!(registry.dialer.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_current_context_redials_eagerly() {
        let (_dir, registry) = registry(FakeDialer::new());
        registry.create(&tcp("prod", "tcp://10.0.0.5:2375")).unwrap();
        registry.store().set_current("prod").unwrap();

        let old = registry.get("prod").await.unwrap();
        registry
            .update("prod", &tcp("prod", "tcp://10.0.0.6:2375"))
            .await
            .unwrap();

        let new = registry.get("prod").await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        // One dial for the first get, one for the eager reopen; the
        // second get reuses the reopened handle.
        assert_eq!(registry.dialer.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_non_current_context_invalidates_lazily() {
        let (_dir, registry) = registry(FakeDialer::new());
        registry.create(&tcp("dev", "tcp://10.0.0.5:2375")).unwrap();

        let old = registry.get("dev").await.unwrap();
        registry
            .update("dev", &tcp("dev", "tcp://10.0.0.6:2375"))
            .await
            .unwrap();
        // No eager dial for a non-current context.
        assert_eq!(registry.dialer.dials.load(Ordering::SeqCst), 1);

        let new = registry.get("dev").await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
    }

    #[tokio::test]
    async fn delete_current_context_is_refused() {
        let (_dir, registry) = registry(FakeDialer::new());
        registry.create(&tcp("prod", "tcp://a:1")).unwrap();
        registry.store().set_current("prod").unwrap();

        let err = registry.delete("prod").await.unwrap_err();
        assert!(matches!(err, RegistryError::Store(StoreError::InUse(_))));
    }

    #[tokio::test]
    async fn delete_drops_descriptor_and_handle() {
        let (_dir, registry) = registry(FakeDialer::new());
        registry.create(&tcp("dev", "tcp://a:1")).unwrap();
        let _ = registry.get("dev").await.unwrap();

        registry.delete("dev").await.unwrap();
        let err = registry.get("dev").await.err().unwrap();
        assert!(matches!(
            err,
            RegistryError::Store(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalidate_only_touches_named_context() {
        let (_dir, registry) = registry(FakeDialer::new());
        registry.create(&tcp("a", "tcp://a:1")).unwrap();
        registry.create(&tcp("b", "tcp://b:1")).unwrap();

        let a1 = registry.get("a").await.unwrap();
        let b1 = registry.get("b").await.unwrap();
        registry.invalidate("a").await;

        let a2 = registry.get("a").await.unwrap();
        let b2 = registry.get("b").await.unwrap();
        assert!(!Arc::ptr_eq(&a1, &a2));
        assert!(Arc::ptr_eq(&b1, &b2));
    }

    #[tokio::test]
    async fn failed_get_leaves_no_map_entry() {
        let (_dir, registry) = registry(FakeDialer::failing());
        for i in 0..10 {
            let _ = registry.get(&format!("ghost-{i}")).await.err().unwrap();
        }
        // Dial failures are discarded the same way as unknown names.
        registry.create(&tcp("prod", "tcp://10.0.0.5:2375")).unwrap();
        let _ = registry.get("prod").await.err().unwrap();

        assert!(registry.handles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_host_in_document_fails_get() {
        let (dir, registry) = registry(FakeDialer::new());
        std::fs::write(
            dir.path().join("contexts.json"),
            r#"{"contexts": {"bad": {"type": "tcp", "host": "10.0.0.5"}}, "current-context": ""}"#,
        )
        .unwrap();

        let err = registry.get("bad").await.err().unwrap();
        assert!(matches!(
            err,
            RegistryError::Store(StoreError::InvalidAddress(_))
        ));
        assert_eq!(registry.dialer.dials.load(Ordering::SeqCst), 0);
    }
}
