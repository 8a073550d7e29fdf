//! MCP tool parameter types.
//! These structs are deserialized by rmcp macros but not directly constructed.

use schemars::JsonSchema;
use serde::Deserialize;

/// Parameters for connect tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConnectParams {
    /// MongoDB connection string, e.g. mongodb://localhost:27017
    pub connection_string: String,
    /// Display name for this connection. Also used for the saved profile.
    pub name: String,
}

/// Parameters for disconnect tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DisconnectParams {
    /// The connection id returned by connect.
    pub connection_id: String,
}

/// Parameters for list_databases tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListDatabasesParams {
    /// The connection id returned by connect.
    pub connection_id: String,
}

/// Parameters for list_collections tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListCollectionsParams {
    /// The connection id returned by connect.
    pub connection_id: String,
    /// The database name from list_databases. Case-sensitive.
    pub database: String,
}

/// Parameters for list_documents tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListDocumentsParams {
    /// The connection id returned by connect.
    pub connection_id: String,
    /// The database name from list_databases. Case-sensitive.
    pub database: String,
    /// The collection name from list_collections. Case-sensitive.
    pub collection: String,
    /// Filter as a JSON object. Defaults to {} (all documents).
    #[serde(default)]
    pub filter: Option<String>,
    /// Number of documents to skip. Defaults to 0.
    #[serde(default)]
    pub skip: Option<u64>,
    /// Maximum documents per page. Defaults to the configured page size.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Sort order as a JSON object. Example: {"createdAt": -1} for descending.
    /// Defaults to {"_id": 1}.
    #[serde(default)]
    pub sort: Option<String>,
}

/// Parameters for execute_query tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteQueryParams {
    /// The connection id returned by connect.
    pub connection_id: String,
    /// The database name from list_databases. Case-sensitive.
    pub database: String,
    /// The collection name from list_collections. Case-sensitive.
    pub collection: String,
    /// One of: find, findOne, insertOne, insertMany, updateOne, updateMany,
    /// deleteOne, deleteMany, aggregate. Anything else is rejected.
    pub operation: String,
    /// Operation arguments as JSON: a filter {} for find/findOne/deleteOne/
    /// deleteMany, a document for insertOne, an array of documents for
    /// insertMany, {"filter": {}, "update": {}} for updateOne/updateMany,
    /// a pipeline [] for aggregate.
    pub query: String,
}

/// Parameters for delete_profile tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteProfileParams {
    /// The profile id from list_saved_profiles. Not a connection id.
    pub profile_id: String,
}
