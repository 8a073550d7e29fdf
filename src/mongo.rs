//! MongoDB driver backend.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::connection::{Connector, DatabaseBackend};
use crate::error::{Error, Result};
use crate::query::{PageQuery, QueryPlan, QueryResult};

/// Connector producing live driver-backed connections.
pub struct MongoConnector {
    connect_timeout: Duration,
    server_selection_timeout: Duration,
    query_timeout_secs: u64,
}

impl MongoConnector {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            server_selection_timeout: Duration::from_secs(config.server_selection_timeout_secs),
            query_timeout_secs: config.query_timeout_secs,
        }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, connection_string: &str) -> Result<Arc<dyn DatabaseBackend>> {
        let mut options = ClientOptions::parse(connection_string)
            .await
            .map_err(Error::connection)?;

        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.server_selection_timeout);

        let client = Client::with_options(options).map_err(Error::connection)?;

        // The driver connects lazily; ping so an unreachable host or bad
        // credentials fail at connect time, not on the first query.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(Error::connection)?;

        Ok(Arc::new(MongoBackend {
            client,
            query_timeout_secs: self.query_timeout_secs,
        }))
    }
}

/// A connected MongoDB client. Query paths are wrapped in a per-call
/// timeout; elapse surfaces as [`Error::Timeout`].
pub struct MongoBackend {
    client: Client,
    query_timeout_secs: u64,
}

fn find_options(page: &PageQuery) -> FindOptions {
    let mut options = FindOptions::default();
    options.skip = Some(page.skip);
    options.limit = Some(page.limit);
    options.sort = Some(page.sort.clone());
    options
}

impl MongoBackend {
    fn collection(&self, db: &str, collection: &str) -> Collection<Document> {
        self.client.database(db).collection::<Document>(collection)
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>> + Send) -> Result<T> {
        match tokio::time::timeout(Duration::from_secs(self.query_timeout_secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.query_timeout_secs)),
        }
    }

    async fn run_plan(coll: Collection<Document>, plan: &QueryPlan) -> Result<QueryResult> {
        match plan {
            QueryPlan::Find { filter } => {
                let cursor = coll.find(filter.clone()).await.map_err(Error::execution)?;
                let documents: Vec<Document> =
                    cursor.try_collect().await.map_err(Error::execution)?;
                Ok(QueryResult::Documents { documents })
            }
            QueryPlan::FindOne { filter } => {
                let document = coll
                    .find_one(filter.clone())
                    .await
                    .map_err(Error::execution)?;
                Ok(QueryResult::Document { document })
            }
            QueryPlan::InsertOne { document } => {
                let result = coll
                    .insert_one(document.clone())
                    .await
                    .map_err(Error::execution)?;
                Ok(QueryResult::Inserted {
                    inserted_ids: vec![result.inserted_id],
                })
            }
            QueryPlan::InsertMany { documents } => {
                let result = coll
                    .insert_many(documents.clone())
                    .await
                    .map_err(Error::execution)?;
                // The driver reports ids keyed by input index.
                let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
                ids.sort_by_key(|(index, _)| *index);
                Ok(QueryResult::Inserted {
                    inserted_ids: ids.into_iter().map(|(_, id)| id).collect(),
                })
            }
            QueryPlan::UpdateOne { filter, update } => {
                let result = coll
                    .update_one(filter.clone(), update.clone())
                    .await
                    .map_err(Error::execution)?;
                Ok(QueryResult::Updated {
                    matched: result.matched_count,
                    modified: result.modified_count,
                })
            }
            QueryPlan::UpdateMany { filter, update } => {
                let result = coll
                    .update_many(filter.clone(), update.clone())
                    .await
                    .map_err(Error::execution)?;
                Ok(QueryResult::Updated {
                    matched: result.matched_count,
                    modified: result.modified_count,
                })
            }
            QueryPlan::DeleteOne { filter } => {
                let result = coll
                    .delete_one(filter.clone())
                    .await
                    .map_err(Error::execution)?;
                Ok(QueryResult::Deleted {
                    deleted: result.deleted_count,
                })
            }
            QueryPlan::DeleteMany { filter } => {
                let result = coll
                    .delete_many(filter.clone())
                    .await
                    .map_err(Error::execution)?;
                Ok(QueryResult::Deleted {
                    deleted: result.deleted_count,
                })
            }
            QueryPlan::Aggregate { pipeline } => {
                let cursor = coll
                    .aggregate(pipeline.clone())
                    .await
                    .map_err(Error::execution)?;
                let documents: Vec<Document> =
                    cursor.try_collect().await.map_err(Error::execution)?;
                Ok(QueryResult::Documents { documents })
            }
        }
    }
}

#[async_trait]
impl DatabaseBackend for MongoBackend {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let mut names = self
            .client
            .list_database_names()
            .await
            .map_err(Error::execution)?;

        // Sort for deterministic output
        names.sort();

        Ok(names)
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        let mut names = self
            .client
            .database(db)
            .list_collection_names()
            .await
            .map_err(Error::execution)?;

        names.sort();

        Ok(names)
    }

    async fn find_page(
        &self,
        db: &str,
        collection: &str,
        filter: Document,
        page: &PageQuery,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(db, collection);
        let options = find_options(page);

        self.with_timeout(async move {
            let cursor = coll
                .find(filter)
                .with_options(options)
                .await
                .map_err(Error::execution)?;
            cursor.try_collect().await.map_err(Error::execution)
        })
        .await
    }

    async fn count_documents(&self, db: &str, collection: &str, filter: Document) -> Result<u64> {
        let coll = self.collection(db, collection);

        self.with_timeout(async move {
            coll.count_documents(filter).await.map_err(Error::execution)
        })
        .await
    }

    async fn run(&self, db: &str, collection: &str, plan: &QueryPlan) -> Result<QueryResult> {
        let coll = self.collection(db, collection);

        tracing::debug!(
            "Running {} against {}.{}",
            plan.operation().as_str(),
            db,
            collection
        );

        self.with_timeout(Self::run_plan(coll, plan)).await
    }

    async fn close(&self) -> Result<()> {
        // shutdown() consumes a client; the clone shares the same topology.
        self.client.clone().shutdown().await;
        Ok(())
    }
}
