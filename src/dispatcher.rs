//! Stateless query dispatch.
//!
//! Every call re-resolves the connection handle and re-queries the service;
//! nothing is cached here. Ad-hoc execution goes through the enumerated
//! [`QueryPlan`] gate, never through anything built from request text.

use mongodb::bson::Document;
use serde::Serialize;
use std::sync::Arc;

use crate::connection::ConnectionRegistry;
use crate::error::Result;
use crate::query::{PageQuery, QueryPlan, QueryRequest, QueryResult};

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
}

/// One page of a browse listing. `total` counts every filter match,
/// unbounded by the page's skip/limit, so callers can derive page counts.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub total: u64,
}

pub struct QueryDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl QueryDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn list_collections(
        &self,
        connection_id: &str,
        db: &str,
    ) -> Result<Vec<CollectionInfo>> {
        let handle = self.registry.lookup(connection_id).await?;
        let names = handle.backend().list_collections(db).await?;
        Ok(names.into_iter().map(|name| CollectionInfo { name }).collect())
    }

    pub async fn list_documents(
        &self,
        connection_id: &str,
        db: &str,
        collection: &str,
        filter: Document,
        page: &PageQuery,
    ) -> Result<DocumentPage> {
        let handle = self.registry.lookup(connection_id).await?;

        let documents = handle
            .backend()
            .find_page(db, collection, filter.clone(), page)
            .await?;
        let total = handle.backend().count_documents(db, collection, filter).await?;

        tracing::debug!(
            "Listed {} of {} documents from {}.{}",
            documents.len(),
            total,
            db,
            collection
        );

        Ok(DocumentPage { documents, total })
    }

    pub async fn execute(
        &self,
        connection_id: &str,
        db: &str,
        request: &QueryRequest,
    ) -> Result<QueryResult> {
        let handle = self.registry.lookup(connection_id).await?;

        // The allow-list gate: an unknown operation or a malformed argument
        // body fails here, before the service sees anything.
        let plan = QueryPlan::parse(request)?;

        tracing::info!(
            "Executing {} on {}.{}",
            plan.operation().as_str(),
            db,
            request.collection
        );

        handle.backend().run(db, &request.collection, &plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{MockBackend, registry_with};
    use crate::error::Error;
    use mongodb::bson::doc;
    use std::sync::atomic::Ordering;

    fn request(operation: &str, query: &str) -> QueryRequest {
        QueryRequest {
            collection: "users".to_string(),
            operation: operation.to_string(),
            query: query.to_string(),
        }
    }

    async fn connected() -> (Arc<MockBackend>, QueryDispatcher, String) {
        let backend = Arc::new(MockBackend::seeded());
        let registry = Arc::new(registry_with(backend.clone()));
        let handle = registry.connect("mock://testdb", "Test").await.unwrap();
        (backend, QueryDispatcher::new(registry), handle.id.clone())
    }

    #[tokio::test]
    async fn test_unknown_connection_is_not_found() {
        let (_, dispatcher, _) = connected().await;

        let err = dispatcher
            .execute("no-such-id", "testdb", &request("find", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_unsupported_operation_never_reaches_backend() {
        let (backend, dispatcher, id) = connected().await;

        let err = dispatcher
            .execute(&id, "testdb", &request("dropDatabase", "{}"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedOperation(_)));
        // Zero service invocations, and the seeded data is intact.
        assert_eq!(backend.run_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.collection("testdb", "users").len(), 3);
    }

    #[tokio::test]
    async fn test_execute_find_returns_materialized_documents() {
        let (_, dispatcher, id) = connected().await;

        let result = dispatcher
            .execute(&id, "testdb", &request("find", r#"{"name": "ada"}"#))
            .await
            .unwrap();

        let QueryResult::Documents { documents } = result else {
            panic!("expected documents, got {result:?}");
        };
        assert_eq!(documents.len(), 2);
        // Already concrete: serializes with no handle in sight.
        assert!(serde_json::to_string(&documents).is_ok());
    }

    #[tokio::test]
    async fn test_execute_mutating_operations() {
        let (backend, dispatcher, id) = connected().await;

        let result = dispatcher
            .execute(
                &id,
                "testdb",
                &request("insertOne", r#"{"_id": 4, "name": "joan"}"#),
            )
            .await
            .unwrap();
        assert!(matches!(result, QueryResult::Inserted { ref inserted_ids } if inserted_ids.len() == 1));
        assert_eq!(backend.collection("testdb", "users").len(), 4);

        let result = dispatcher
            .execute(&id, "testdb", &request("deleteMany", r#"{"name": "ada"}"#))
            .await
            .unwrap();
        assert!(matches!(result, QueryResult::Deleted { deleted: 2 }));
        assert_eq!(backend.collection("testdb", "users").len(), 2);
    }

    #[tokio::test]
    async fn test_list_documents_respects_limit() {
        let (_, dispatcher, id) = connected().await;

        let page = PageQuery::new(Some(0), Some(2), None);
        let result = dispatcher
            .list_documents(&id, "testdb", "users", doc! {}, &page)
            .await
            .unwrap();

        assert!(result.documents.len() <= page.limit as usize);
        assert_eq!(result.documents.len(), 2);
    }

    #[tokio::test]
    async fn test_list_documents_total_ignores_paging() {
        let (_, dispatcher, id) = connected().await;

        for (skip, limit) in [(0, 1), (2, 1), (0, 100), (5, 2)] {
            let page = PageQuery::new(Some(skip), Some(limit), None);
            let result = dispatcher
                .list_documents(&id, "testdb", "users", doc! {}, &page)
                .await
                .unwrap();
            assert_eq!(result.total, 3, "skip {skip} limit {limit}");
        }
    }

    #[tokio::test]
    async fn test_browse_scenario() {
        let backend = Arc::new(MockBackend::seeded());
        let registry = Arc::new(registry_with(backend));
        let dispatcher = QueryDispatcher::new(registry.clone());

        let handle = registry.connect("mock://testdb", "Test").await.unwrap();

        let collections = dispatcher
            .list_collections(&handle.id, "testdb")
            .await
            .unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, "users");

        let page = PageQuery::new(Some(0), Some(10), None);
        let result = dispatcher
            .list_documents(&handle.id, "testdb", "users", doc! {}, &page)
            .await
            .unwrap();
        assert_eq!(result.documents.len(), 3);
        assert_eq!(result.total, 3);

        let saved = registry.profiles().all().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(registry.profiles().delete_by_id(&saved[0].id).unwrap());
        assert!(registry.profiles().all().unwrap().is_empty());
        // The live handle is unaffected by the profile going away.
        assert!(registry.lookup(&handle.id).await.is_ok());
    }
}
