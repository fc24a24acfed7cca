//! On-demand instantiation and bookkeeping of platform adapters.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::platform::adapter::{NoopAdapter, PlatformAdapter};

/// Builds a concrete adapter for a known platform name from its credentials
/// and config subtrees. Concrete wire protocols live outside this crate;
/// callers register factories for the platforms they support.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// Build an adapter instance. Returns `None` if the credentials are
    /// unusable; the registry falls back to a no-op adapter in that case.
    async fn build(&self, credentials: &Value, config: &Value) -> Option<Arc<dyn PlatformAdapter>>;
}

/// Name → adapter table, with supersede-and-shutdown semantics: connecting
/// the same platform name twice results in exactly one active adapter, and
/// the superseded one has `shutdown()` called on it.
#[derive(Default)]
pub struct PlatformRegistry {
    factories: Mutex<HashMap<String, Arc<dyn AdapterFactory>>>,
    adapters: Mutex<HashMap<String, Arc<dyn PlatformAdapter>>>,
}

impl PlatformRegistry {
    /// Empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a factory for `platform`, making it a "known" name.
    pub async fn register_factory(&self, platform: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        self.factories.lock().await.insert(platform.into(), factory);
    }

    /// Handle a `platform_connect` frame: build (or fall back to a no-op)
    /// adapter, initialize it, and install it, shutting down whatever was
    /// there before.
    pub async fn connect(&self, platform: &str, credentials: &Value, config: &Value) -> Arc<dyn PlatformAdapter> {
        let factory = self.factories.lock().await.get(platform).cloned();

        let adapter: Arc<dyn PlatformAdapter> = match factory {
            Some(factory) => match factory.build(credentials, config).await {
                Some(adapter) => adapter,
                None => Arc::new(NoopAdapter::new(platform)),
            },
            None => Arc::new(NoopAdapter::new(platform)),
        };

        adapter.initialize().await;

        let previous = self.adapters.lock().await.insert(platform.to_string(), adapter.clone());
        if let Some(previous) = previous {
            previous.shutdown().await;
        }

        adapter
    }

    /// Look up the currently active adapter for `platform`, if any.
    pub async fn get(&self, platform: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.lock().await.get(platform).cloned()
    }

    /// Shut down and remove every adapter.
    pub async fn shutdown_all(&self) {
        let mut adapters = self.adapters.lock().await;
        for (_, adapter) in adapters.drain() {
            adapter.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter {
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PlatformAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }
        async fn initialize(&self) -> bool {
            true
        }
        async fn send_text(&self, _: &str, _: &str, _: Option<&str>) -> Option<crate::model::PlatformMessage> {
            None
        }
        async fn send_media(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
            _: crate::model::MessageKind,
        ) -> Option<crate::model::PlatformMessage> {
            None
        }
        async fn send_document(&self, _: &str, _: &str, _: Option<&str>) -> Option<crate::model::PlatformMessage> {
            None
        }
        async fn download_media(&self, _: &str, _: &str) -> Option<String> {
            None
        }
        async fn make_call(&self, _: &str, _: bool) -> bool {
            false
        }
        async fn handle_webhook(&self, _: &[u8]) -> Option<crate::model::PlatformMessage> {
            None
        }
        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingFactory {
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AdapterFactory for CountingFactory {
        async fn build(&self, _credentials: &Value, _config: &Value) -> Option<Arc<dyn PlatformAdapter>> {
            Some(Arc::new(CountingAdapter {
                shutdowns: self.shutdowns.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn unknown_platform_gets_noop_adapter() {
        let registry = PlatformRegistry::new();
        let adapter = registry.connect("mystery", &Value::Null, &Value::Null).await;
        assert!(adapter.send_text("c1", "hi", None).await.is_none());
    }

    #[tokio::test]
    async fn reconnecting_supersedes_and_shuts_down_old_adapter() {
        let registry = PlatformRegistry::new();
        let shutdowns = Arc::new(AtomicUsize::new(0));
        registry
            .register_factory("telegram", Arc::new(CountingFactory { shutdowns: shutdowns.clone() }))
            .await;

        registry.connect("telegram", &Value::Null, &Value::Null).await;
        registry.connect("telegram", &Value::Null, &Value::Null).await;

        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(registry.get("telegram").await.is_some());
    }
}
