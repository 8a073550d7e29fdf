//! Query operations, argument decoding, and the normalized result shape.

use mongodb::bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Documents returned by a single page when the caller gives no limit.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// The closed set of operations the dispatcher will execute.
/// Anything outside this set is rejected before the service is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryOperation {
    Find,
    FindOne,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Aggregate,
}

impl QueryOperation {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "find" => Ok(Self::Find),
            "findone" => Ok(Self::FindOne),
            "insertone" => Ok(Self::InsertOne),
            "insertmany" => Ok(Self::InsertMany),
            "updateone" => Ok(Self::UpdateOne),
            "updatemany" => Ok(Self::UpdateMany),
            "deleteone" => Ok(Self::DeleteOne),
            "deletemany" => Ok(Self::DeleteMany),
            "aggregate" => Ok(Self::Aggregate),
            _ => Err(Error::UnsupportedOperation(s.to_string())),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::FindOne => "findOne",
            Self::InsertOne => "insertOne",
            Self::InsertMany => "insertMany",
            Self::UpdateOne => "updateOne",
            Self::UpdateMany => "updateMany",
            Self::DeleteOne => "deleteOne",
            Self::DeleteMany => "deleteMany",
            Self::Aggregate => "aggregate",
        }
    }
}

/// An ad-hoc query as supplied by the caller: operation name and raw
/// argument JSON, not yet validated.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub collection: String,
    pub operation: String,
    pub query: String,
}

/// Argument shape for updateOne/updateMany.
#[derive(Debug, Deserialize)]
struct UpdateArgs {
    filter: Document,
    update: Document,
}

/// A validated, fully decoded query ready to run against a collection.
///
/// Construction is the allow-list gate: an unknown operation name or an
/// argument body that does not decode never produces a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    Find { filter: Document },
    FindOne { filter: Document },
    InsertOne { document: Document },
    InsertMany { documents: Vec<Document> },
    UpdateOne { filter: Document, update: Document },
    UpdateMany { filter: Document, update: Document },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
    Aggregate { pipeline: Vec<Document> },
}

impl QueryPlan {
    pub fn parse(request: &QueryRequest) -> Result<Self> {
        // Operation name first: an unlisted operation must fail without the
        // argument body ever being looked at.
        let operation = QueryOperation::from_str(&request.operation)?;
        Self::decode(operation, &request.query)
    }

    fn decode(operation: QueryOperation, query: &str) -> Result<Self> {
        let plan = match operation {
            QueryOperation::Find => Self::Find {
                filter: parse_json(query, "filter")?,
            },
            QueryOperation::FindOne => Self::FindOne {
                filter: parse_json(query, "filter")?,
            },
            QueryOperation::InsertOne => Self::InsertOne {
                document: parse_json(query, "document")?,
            },
            QueryOperation::InsertMany => Self::InsertMany {
                documents: parse_json(query, "document array")?,
            },
            QueryOperation::UpdateOne => {
                let args: UpdateArgs = parse_json(query, "update arguments")?;
                Self::UpdateOne {
                    filter: args.filter,
                    update: args.update,
                }
            }
            QueryOperation::UpdateMany => {
                let args: UpdateArgs = parse_json(query, "update arguments")?;
                Self::UpdateMany {
                    filter: args.filter,
                    update: args.update,
                }
            }
            QueryOperation::DeleteOne => Self::DeleteOne {
                filter: parse_json(query, "filter")?,
            },
            QueryOperation::DeleteMany => Self::DeleteMany {
                filter: parse_json(query, "filter")?,
            },
            QueryOperation::Aggregate => Self::Aggregate {
                pipeline: parse_json(query, "pipeline")?,
            },
        };

        Ok(plan)
    }

    pub const fn operation(&self) -> QueryOperation {
        match self {
            Self::Find { .. } => QueryOperation::Find,
            Self::FindOne { .. } => QueryOperation::FindOne,
            Self::InsertOne { .. } => QueryOperation::InsertOne,
            Self::InsertMany { .. } => QueryOperation::InsertMany,
            Self::UpdateOne { .. } => QueryOperation::UpdateOne,
            Self::UpdateMany { .. } => QueryOperation::UpdateMany,
            Self::DeleteOne { .. } => QueryOperation::DeleteOne,
            Self::DeleteMany { .. } => QueryOperation::DeleteMany,
            Self::Aggregate { .. } => QueryOperation::Aggregate,
        }
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(json: &str, what: &'static str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::serialization(what, e))
}

/// Paging for the browse path. `limit` is always positive: an absent or
/// non-positive caller value becomes [`DEFAULT_PAGE_LIMIT`].
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub skip: u64,
    pub limit: i64,
    pub sort: Document,
}

impl PageQuery {
    pub fn new(skip: Option<u64>, limit: Option<i64>, sort: Option<Document>) -> Self {
        Self {
            skip: skip.unwrap_or(0),
            limit: match limit {
                Some(l) if l > 0 => l,
                _ => DEFAULT_PAGE_LIMIT,
            },
            // Insertion-order surrogate: ascending by _id.
            sort: sort.unwrap_or_else(|| doc! { "_id": 1 }),
        }
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// Normalized query outcome. Cursor-producing operations are materialized
/// before this is built, so the caller always holds concrete documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QueryResult {
    /// find / aggregate
    Documents { documents: Vec<Document> },
    /// findOne
    Document { document: Option<Document> },
    /// insertOne / insertMany, ids in input order
    Inserted { inserted_ids: Vec<Bson> },
    /// updateOne / updateMany
    Updated { matched: u64, modified: u64 },
    /// deleteOne / deleteMany
    Deleted { deleted: u64 },
}
