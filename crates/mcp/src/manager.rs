use crate::channel::EventChannel;
use crate::session::McpSession;
use crate::tools::ProviderCatalog;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Process-wide registry of live sessions, keyed by client identity
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Arc<McpSession>>>>,
    catalog: Arc<ProviderCatalog>,
    channel_capacity: Option<usize>,
}

impl SessionManager {
    /// Create a session manager building registries from `catalog`
    pub fn new(catalog: ProviderCatalog) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            catalog: Arc::new(catalog),
            channel_capacity: None,
        }
    }

    /// Bound every new session's event channel
    pub fn with_channel_capacity(mut self, capacity: Option<usize>) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Create a session with a fresh tool registry and store it
    pub fn create_session(
        &self,
        name: &str,
        request_path: &str,
        tool_source: &str,
    ) -> Arc<McpSession> {
        let registry = self.catalog.discover(tool_source);
        let channel = EventChannel::with_capacity(self.channel_capacity);
        let session = Arc::new(McpSession::new(name, request_path, registry, channel));

        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.id().to_string(), session.clone());

        tracing::info!(
            "Created session {} ({}) with {} tools",
            session.id(),
            name,
            session.registry().len()
        );

        session
    }

    /// Get a session by client identity
    pub fn get_session(&self, id: &str) -> Option<Arc<McpSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Remove a session. Removing an unknown id is a no-op.
    ///
    /// The channel is left open; the returned session is the caller's to close.
    pub fn delete_session(&self, id: &str) -> Option<Arc<McpSession>> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);

        if removed.is_some() {
            tracing::info!("Deleted session {}", id);
        }
        removed
    }

    /// Snapshot of all live sessions
    pub fn all_sessions(&self) -> Vec<Arc<McpSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ENDPOINT_EVENT;
    use crate::protocol::JsonRpcRequest;
    use crate::tools::MathService;

    fn manager() -> SessionManager {
        let mut catalog = ProviderCatalog::new();
        catalog.register("services", "math", MathService::provider);
        SessionManager::new(catalog)
    }

    #[test]
    fn test_create_then_get() {
        let manager = manager();
        let session = manager.create_session("my_mcp", "/rpc", "services");

        let found = manager.get_session(session.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        assert_eq!(found.name(), "my_mcp");
        assert_eq!(found.request_path(), "/rpc");
        assert_eq!(found.registry().len(), 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let manager = manager();
        let session = manager.create_session("my_mcp", "/rpc", "services");
        let id = session.id().to_string();

        assert!(manager.delete_session(&id).is_some());
        assert!(manager.get_session(&id).is_none());
        assert!(manager.delete_session(&id).is_none());
        assert!(manager.is_empty());
        assert!(!session.is_closed());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let manager = manager();
        let first = manager.create_session("my_mcp", "/rpc", "services");
        let second = manager.create_session("my_mcp", "/rpc", "services");

        assert_ne!(first.id(), second.id());
        assert_eq!(manager.all_sessions().len(), 2);

        first.open(ENDPOINT_EVENT).unwrap();
        assert_eq!(first.pending_events(), 1);
        assert_eq!(second.pending_events(), 0);
    }

    #[test]
    fn test_unknown_tool_source_gives_empty_registry() {
        let manager = manager();
        let session = manager.create_session("my_mcp", "/rpc", "plugins");
        assert!(session.registry().is_empty());
    }

    #[test]
    fn test_channel_capacity_applies_to_new_sessions() {
        let manager = manager().with_channel_capacity(Some(1));
        let session = manager.create_session("my_mcp", "/rpc", "services");

        session.open(ENDPOINT_EVENT).unwrap();
        session.open(ENDPOINT_EVENT).unwrap();
        assert_eq!(session.pending_events(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_create_and_dispatch() {
        let manager = Arc::new(manager());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let session = manager.create_session("my_mcp", "/rpc", "services");
                    session
                        .dispatch(JsonRpcRequest::notification("initialize"))
                        .await
                        .unwrap();
                    if i % 2 == 0 {
                        manager.delete_session(session.id());
                    }
                    session.pending_events()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
        assert_eq!(manager.len(), 8);
    }
}
