//! MCP server implementation with tool handlers.
//!
//! This is the presentation boundary: every tool returns a tagged
//! success/failure, and no dispatch failure escapes as anything else.

use mongodb::bson::Document;
use rmcp::{
    ServerHandler,
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

use crate::config::Config;
use crate::connection::ConnectionRegistry;
use crate::dispatcher::QueryDispatcher;
use crate::error::Error;
use crate::query::{PageQuery, QueryRequest};
use crate::tools::*;

/// Format an error with its full cause chain.
fn error_chain(e: &Error) -> String {
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Format an anyhow error with its full cause chain.
fn format_error(e: &anyhow::Error) -> String {
    let mut msg = e.to_string();
    for cause in e.chain().skip(1) {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
    }
    msg
}

/// Map the dispatch taxonomy onto the MCP error surface: caller mistakes
/// are invalid-params, service-side failures are internal errors.
fn tool_error(e: &Error) -> rmcp::ErrorData {
    match e {
        Error::ConnectionNotFound(_)
        | Error::UnsupportedOperation(_)
        | Error::Serialization { .. } => rmcp::ErrorData::invalid_params(error_chain(e), None),
        Error::Connection(_) | Error::Execution(_) | Error::Timeout(_) => {
            rmcp::ErrorData::internal_error(error_chain(e), None)
        }
    }
}

fn parse_document(json: Option<&str>, what: &'static str) -> Result<Document, rmcp::ErrorData> {
    match json {
        None => Ok(Document::new()),
        Some(s) => serde_json::from_str(s)
            .map_err(|e| tool_error(&Error::serialization(what, e))),
    }
}

/// Page metadata the way the browse UI expects it: 1-based page number and
/// the page count implied by `total`.
fn page_metadata(skip: u64, limit: i64, total: u64) -> (u64, u64) {
    let limit = limit as u64;
    (skip / limit + 1, total.div_ceil(limit))
}

pub struct McpServer {
    name: String,
    version: String,
    config: Config,
    registry: Arc<ConnectionRegistry>,
    dispatcher: QueryDispatcher,
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        config: Config,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            config,
            dispatcher: QueryDispatcher::new(registry.clone()),
            registry,
            tool_router: Self::tool_router(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        use rmcp::ServiceExt;

        tracing::info!("MCP server starting: {} v{}", self.name, self.version);

        let transport = rmcp::transport::stdio();
        let server = self.serve(transport).await?;
        server.waiting().await?;

        tracing::info!("MCP server shutting down");
        Ok(())
    }

    fn json_response(value: &impl serde::Serialize) -> Result<CallToolResult, rmcp::ErrorData> {
        let text = serde_json::to_string_pretty(value).map_err(|e| {
            rmcp::ErrorData::internal_error(format!("Failed to serialize response: {e}"), None)
        })?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_router]
impl McpServer {
    /// Connects to a MongoDB deployment and registers a live connection.
    ///
    /// Returns the connection id used by every other tool, plus the
    /// databases visible on the deployment. The connection string is saved
    /// as a profile unless one with the same string already exists.
    #[tool]
    async fn connect(
        &self,
        Parameters(params): Parameters<ConnectParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let handle = self
            .registry
            .connect(&params.connection_string, &params.name)
            .await
            .map_err(|e| tool_error(&e))?;

        let databases = match handle.backend().list_databases().await {
            Ok(databases) => databases,
            Err(e) => {
                // A handle the caller never saw the id of is useless; drop it.
                let _ = self.registry.close(&handle.id).await;
                return Err(tool_error(&e));
            }
        };

        let response = serde_json::json!({
            "id": handle.id,
            "name": handle.name,
            "created_at": handle.created_at.to_rfc3339(),
            "databases": databases,
        });

        Self::json_response(&response)
    }

    /// Closes a live connection and removes it from the registry.
    ///
    /// Saved profiles are unaffected; use delete_profile for those.
    #[tool]
    async fn disconnect(
        &self,
        Parameters(params): Parameters<DisconnectParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        self.registry
            .close(&params.connection_id)
            .await
            .map_err(|e| tool_error(&e))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Connection '{}' closed",
            params.connection_id
        ))]))
    }

    /// Lists all live connections with their ids.
    #[tool]
    async fn list_connections(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        let connections = self.registry.list().await;

        let response = serde_json::json!({
            "connections": connections.iter().map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "name": c.name,
                    "created_at": c.created_at.to_rfc3339(),
                })
            }).collect::<Vec<_>>(),
            "count": connections.len(),
        });

        Self::json_response(&response)
    }

    /// Lists the database names visible on a connection.
    #[tool]
    async fn list_databases(
        &self,
        Parameters(params): Parameters<ListDatabasesParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let handle = self
            .registry
            .lookup(&params.connection_id)
            .await
            .map_err(|e| tool_error(&e))?;

        let databases = handle
            .backend()
            .list_databases()
            .await
            .map_err(|e| tool_error(&e))?;

        let response = serde_json::json!({
            "databases": databases,
            "count": databases.len(),
        });

        Self::json_response(&response)
    }

    /// Lists the collections in a database.
    ///
    /// IMPORTANT: Collection names are CASE-SENSITIVE in MongoDB!
    #[tool]
    async fn list_collections(
        &self,
        Parameters(params): Parameters<ListCollectionsParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let collections = self
            .dispatcher
            .list_collections(&params.connection_id, &params.database)
            .await
            .map_err(|e| tool_error(&e))?;

        let response = serde_json::json!({
            "database": params.database,
            "collections": collections,
            "count": collections.len(),
        });

        Self::json_response(&response)
    }

    /// Pages through the documents of a collection.
    ///
    /// Applies filter, skip, limit, and sort, and also reports the total
    /// number of filter matches so the caller can compute page counts.
    /// Defaults: filter {}, skip 0, the configured page limit, sort
    /// {"_id": 1}.
    #[tool]
    async fn list_documents(
        &self,
        Parameters(params): Parameters<ListDocumentsParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let filter = parse_document(params.filter.as_deref(), "filter")?;
        let sort = match params.sort.as_deref() {
            None => None,
            Some(s) => Some(parse_document(Some(s), "sort")?),
        };

        let page = PageQuery::new(
            params.skip,
            params.limit.or(Some(self.config.default_page_limit)),
            sort,
        );

        let result = self
            .dispatcher
            .list_documents(
                &params.connection_id,
                &params.database,
                &params.collection,
                filter,
                &page,
            )
            .await
            .map_err(|e| tool_error(&e))?;

        let (page_number, total_pages) = page_metadata(page.skip, page.limit, result.total);

        let response = serde_json::json!({
            "documents": result.documents,
            "total": result.total,
            "page": page_number,
            "total_pages": total_pages,
        });

        Self::json_response(&response)
    }

    /// Executes an ad-hoc query against a collection.
    ///
    /// Operations: find, findOne, insertOne, insertMany, updateOne,
    /// updateMany, deleteOne, deleteMany, aggregate. Anything outside this
    /// set is rejected without touching the database. Cursor results come
    /// back fully materialized.
    #[tool]
    async fn execute_query(
        &self,
        Parameters(params): Parameters<ExecuteQueryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let request = QueryRequest {
            collection: params.collection,
            operation: params.operation,
            query: params.query,
        };

        let result = self
            .dispatcher
            .execute(&params.connection_id, &params.database, &request)
            .await
            .map_err(|e| tool_error(&e))?;

        Self::json_response(&result)
    }

    /// Lists the saved connection profiles.
    ///
    /// Profiles persist across restarts and are independent of live
    /// connections; pass a profile's connection string to connect.
    #[tool]
    fn list_saved_profiles(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        let profiles = self
            .registry
            .profiles()
            .all()
            .map_err(|e| rmcp::ErrorData::internal_error(format_error(&e), None))?;

        let response = serde_json::json!({
            "profiles": profiles,
            "count": profiles.len(),
        });

        Self::json_response(&response)
    }

    /// Deletes a saved connection profile permanently.
    ///
    /// Live connections are unaffected. WARNING: This action cannot be
    /// undone!
    #[tool]
    fn delete_profile(
        &self,
        Parameters(params): Parameters<DeleteProfileParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let deleted = self
            .registry
            .profiles()
            .delete_by_id(&params.profile_id)
            .map_err(|e| rmcp::ErrorData::internal_error(format_error(&e), None))?;

        if !deleted {
            return Err(rmcp::ErrorData::invalid_params(
                format!("Profile '{}' not found", params.profile_id),
                None,
            ));
        }

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Profile '{}' deleted",
            params.profile_id
        ))]))
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            instructions: Some(
                "MongoDB browser backend. Workflow: \
                 1) connect with a connection string (or one from \
                 list_saved_profiles) to get a connection id and the \
                 database list, \
                 2) list_collections to get exact collection names \
                 (case-sensitive!), \
                 3) list_documents to page through a collection, \
                 4) execute_query for ad-hoc find/insert/update/delete/\
                 aggregate operations. \
                 Disconnect when done; connections also close on shutdown."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_includes_sources() {
        let parse_err = serde_json::from_str::<Document>("{bad").unwrap_err();
        let err = Error::serialization("filter", parse_err);
        let msg = error_chain(&err);
        assert!(msg.starts_with("invalid filter JSON"));
        // The serde source is appended after the top-level message.
        assert!(msg.contains(": "));
    }

    #[test]
    fn test_page_metadata() {
        assert_eq!(page_metadata(0, 10, 35), (1, 4));
        assert_eq!(page_metadata(10, 10, 35), (2, 4));
        assert_eq!(page_metadata(30, 10, 35), (4, 4));
        assert_eq!(page_metadata(0, 10, 0), (1, 0));
        assert_eq!(page_metadata(0, 50, 50), (1, 1));
    }

    #[test]
    fn test_parse_document_defaults_empty() {
        assert_eq!(parse_document(None, "filter").unwrap(), Document::new());
        assert_eq!(
            parse_document(Some(r#"{"name": "ada"}"#), "filter").unwrap(),
            mongodb::bson::doc! { "name": "ada" }
        );
        assert!(parse_document(Some("{bad"), "filter").is_err());
    }
}
