use std::time::Duration;

use argo_types::{ContextDocument, FloatFilter, ResultSet};
use async_trait::async_trait;
use thiserror::Error;

pub mod qdrant;
pub use qdrant::QdrantContextStore;

pub mod memory;
pub use memory::InMemoryContextStore;

pub mod relational;
pub use relational::{DataFusionSettings, DataFusionStore};

mod convert;

#[derive(Debug, Error)]
#[error("data plane error: {message}")]
pub struct DataError {
    pub message: String,
}

impl DataError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure to run a query. Kept apart from an empty [`ResultSet`], which is a
/// valid answer.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("query failed: {0}")]
    Sql(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("relational store unavailable: {0}")]
    Unavailable(String),
}

/// Context document together with its embedding, as written by index seeding.
#[derive(Clone, Debug)]
pub struct IndexedDocument {
    pub document: ContextDocument,
    pub embedding: Vec<f32>,
}

/// Nearest-neighbour index over context documents.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Top-k documents by similarity, best first. With a filter, only documents
    /// whose `float_name` equals the filter are candidates.
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<&FloatFilter>,
    ) -> Result<Vec<ContextDocument>, DataError>;

    /// Insert or replace documents by id.
    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<(), DataError>;
}

/// Read-only SQL access to the telemetry tables.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError>;
}
