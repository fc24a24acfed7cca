//! Tracks active client connections and their metadata.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::model::ClientConnection;

/// Thread-safe map keyed by client id. The gateway binary is the only
/// writer; `send` and diagnostics readers go through `get`/`snapshot`.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: Mutex<HashMap<String, ClientConnection>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a connection. Exactly one entry exists per client id for as
    /// long as its read loop runs.
    pub async fn register(&self, conn: ClientConnection) {
        self.clients.lock().await.insert(conn.id.clone(), conn);
    }

    /// Remove a connection by id. Called by the read loop on its own exit
    /// only; no other task unregisters someone else's connection.
    pub async fn unregister(&self, client_id: &str) -> Option<ClientConnection> {
        self.clients.lock().await.remove(client_id)
    }

    /// Look up a connection's metadata by id.
    pub async fn get(&self, client_id: &str) -> Option<ClientConnection> {
        self.clients.lock().await.get(client_id).cloned()
    }

    /// Whether a connection is currently registered.
    pub async fn contains(&self, client_id: &str) -> bool {
        self.clients.lock().await.contains_key(client_id)
    }

    /// Number of currently registered connections.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Whether the registry holds no connections — true after `stop()`.
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// All currently registered client ids, for best-effort broadcast or
    /// observer notification.
    pub async fn client_ids(&self) -> Vec<String> {
        self.clients.lock().await.keys().cloned().collect()
    }

    /// Remove every connection, returning their ids so the caller can close
    /// the underlying transports. Used by gateway `stop()`.
    pub async fn drain(&self) -> Vec<ClientConnection> {
        self.clients.lock().await.drain().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionClass;

    fn conn(id: &str) -> ClientConnection {
        ClientConnection {
            id: id.to_string(),
            class: ConnectionClass::Local,
            peer: "127.0.0.1".into(),
            since: 0,
            authenticated: false,
            user_agent: None,
            country: None,
        }
    }

    #[tokio::test]
    async fn register_then_unregister_empties_registry() {
        let registry = ConnectionRegistry::new();
        registry.register(conn("c1")).await;
        assert!(registry.contains("c1").await);
        assert_eq!(registry.len().await, 1);
        registry.unregister("c1").await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn drain_empties_and_returns_all() {
        let registry = ConnectionRegistry::new();
        registry.register(conn("c1")).await;
        registry.register(conn("c2")).await;
        let drained = registry.drain().await;
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty().await);
    }
}
