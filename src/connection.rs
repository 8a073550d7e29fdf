//! Live connection registry and the database-service abstraction.
//!
//! Everything downstream of the presentation boundary reaches the database
//! through `dyn DatabaseBackend`, resolved here by connection id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::Document;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::profiles::{ConnectionProfile, ProfileStore};
use crate::query::{PageQuery, QueryPlan, QueryResult};

/// Unified abstraction over a live database service connection.
/// The real implementation drives the MongoDB client; tests substitute an
/// in-memory store.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn list_collections(&self, db: &str) -> Result<Vec<String>>;

    /// One page of documents matching `filter`, ordered by `page.sort`.
    async fn find_page(
        &self,
        db: &str,
        collection: &str,
        filter: Document,
        page: &PageQuery,
    ) -> Result<Vec<Document>>;

    /// Count of all documents matching `filter`, unbounded by paging.
    async fn count_documents(&self, db: &str, collection: &str, filter: Document) -> Result<u64>;

    /// Run a decoded query plan. Cursor-producing plans come back fully
    /// materialized.
    async fn run(&self, db: &str, collection: &str, plan: &QueryPlan) -> Result<QueryResult>;

    /// Close the underlying service connection.
    async fn close(&self) -> Result<()>;
}

/// Factory for backends. Injected into the registry so connect semantics
/// can be exercised without a reachable server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn DatabaseBackend>>;
}

/// A live, connected client plus its identity. One handle per successful
/// connect call; the lifecycle is one-way (connected, then closed).
pub struct ConnectionHandle {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    backend: Arc<dyn DatabaseBackend>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub fn backend(&self) -> &dyn DatabaseBackend {
        self.backend.as_ref()
    }
}

/// Registry of live connections, keyed by opaque id.
///
/// The map is read-mostly: every dispatched request resolves a handle
/// through `lookup`, writes happen only on connect/close.
pub struct ConnectionRegistry {
    connector: Box<dyn Connector>,
    profiles: ProfileStore,
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Box<dyn Connector>, profiles: ProfileStore) -> Self {
        Self {
            connector,
            profiles,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Establish a connection and register it under a fresh id.
    ///
    /// A repeat connect with the same connection string gets a new handle
    /// and id; only the persisted profile is deduplicated (keyed by the
    /// connection string, not the display name).
    pub async fn connect(
        &self,
        connection_string: &str,
        name: &str,
    ) -> Result<Arc<ConnectionHandle>> {
        let backend = self.connector.connect(connection_string).await?;

        let handle = Arc::new(ConnectionHandle {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            backend,
        });

        let profile = ConnectionProfile::new(name, connection_string);
        match self.profiles.save_if_absent(&profile) {
            Ok(true) => tracing::info!("Saved connection profile '{}'", profile.name),
            Ok(false) => tracing::debug!("Connection string already has a saved profile"),
            // The live connection is usable either way.
            Err(e) => tracing::warn!("Failed to persist connection profile: {e:#}"),
        }

        self.connections
            .write()
            .await
            .insert(handle.id.clone(), handle.clone());

        tracing::info!("Connection '{}' established (id {})", name, handle.id);

        Ok(handle)
    }

    pub async fn lookup(&self, id: &str) -> Result<Arc<ConnectionHandle>> {
        self.connections
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ConnectionNotFound(id.to_string()))
    }

    /// Close a connection and drop it from the registry. An unknown id is
    /// reported as not-found, matching `lookup`.
    pub async fn close(&self, id: &str) -> Result<()> {
        let handle = self
            .connections
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::ConnectionNotFound(id.to_string()))?;

        if let Err(e) = handle.backend.close().await {
            // Entry is already gone; the close failure is only worth a log.
            tracing::warn!("Error closing connection '{}': {}", handle.name, e);
        }

        tracing::info!("Connection '{}' closed (id {})", handle.name, id);

        Ok(())
    }

    /// Teardown sweep: close every live handle, best-effort.
    pub async fn close_all(&self) {
        let handles: Vec<_> = self.connections.write().await.drain().collect();

        for (id, handle) in handles {
            if let Err(e) = handle.backend.close().await {
                tracing::warn!("Error closing connection '{}' (id {}): {}", handle.name, id, e);
            }
        }
    }

    /// Live handles, oldest first.
    pub async fn list(&self) -> Vec<Arc<ConnectionHandle>> {
        let mut handles: Vec<_> = self.connections.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        handles
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_connect_allocates_fresh_ids_and_one_profile() {
        let registry = registry_with(Arc::new(MockBackend::seeded()));

        let first = registry.connect("mock://testdb", "Test").await.unwrap();
        let second = registry.connect("mock://testdb", "Test").await.unwrap();

        // Two independent live handles...
        assert_ne!(first.id, second.id);
        assert_eq!(registry.list().await.len(), 2);

        // ...but exactly one persisted profile for the connection string.
        let profiles = registry.profiles().all().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].connection_string, "mock://testdb");
        // Profile ids are not handle ids.
        assert_ne!(profiles[0].id, first.id);
        assert_ne!(profiles[0].id, second.id);
    }

    #[tokio::test]
    async fn test_connect_unreachable_carries_diagnostic() {
        let registry = registry_with(Arc::new(MockBackend::seeded()));

        let err = registry
            .connect("mongodb://nowhere:1", "Broken")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert!(err.to_string().contains("mongodb://nowhere:1"));

        // Nothing was registered or persisted.
        assert!(registry.list().await.is_empty());
        assert!(registry.profiles().all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_unknown_is_not_found() {
        let registry = registry_with(Arc::new(MockBackend::seeded()));

        let err = registry.lookup("no-such-id").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_close_removes_handle() {
        let backend = Arc::new(MockBackend::seeded());
        let registry = registry_with(backend.clone());

        let handle = registry.connect("mock://testdb", "Test").await.unwrap();
        registry.close(&handle.id).await.unwrap();

        assert_eq!(backend.close_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            registry.lookup(&handle.id).await,
            Err(Error::ConnectionNotFound(_))
        ));
        // Closing again reports not-found, consistently with lookup.
        assert!(matches!(
            registry.close(&handle.id).await,
            Err(Error::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_close_all_continues_past_failures() {
        let mut failing = MockBackend::seeded();
        failing.fail_close = true;
        let failing = Arc::new(failing);
        let registry = registry_with(failing.clone());

        registry.connect("mock://testdb", "A").await.unwrap();
        registry.connect("mock://testdb", "B").await.unwrap();

        registry.close_all().await;

        // Both closes were attempted despite each failing.
        assert_eq!(failing.close_calls.load(Ordering::SeqCst), 2);
        assert!(registry.list().await.is_empty());
    }
}
