use std::sync::Arc;

use argo_store::{ContextStore, DataError};
use argo_types::{ContextDocument, FloatFilter};
use tracing::debug;

pub mod seed;
pub use seed::{default_documents, seed_store, SeedError, KONKAN_COAST_FLOAT};

/// Documents retrieved for one question, best match first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetrievedContext {
    pub documents: Vec<ContextDocument>,
}

impl RetrievedContext {
    /// Document texts joined into the block handed to SQL synthesis.
    pub fn block(&self) -> String {
        self.documents
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Outcome of context retrieval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Retrieval {
    Found(RetrievedContext),
    /// A float filter matched no documents. Terminal: never retried unfiltered.
    NoContextForFloat(String),
}

/// Looks up schema context for a question, optionally scoped to one float.
pub struct ContextRetriever {
    store: Arc<dyn ContextStore>,
    top_k: usize,
}

impl ContextRetriever {
    pub const DEFAULT_TOP_K: usize = 2;

    pub fn new(store: Arc<dyn ContextStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        filter: Option<&FloatFilter>,
    ) -> Result<Retrieval, DataError> {
        let documents = self.store.search(query_embedding, self.top_k, filter).await?;
        match filter {
            Some(f) if documents.is_empty() => {
                debug!(float = %f.float_name, "no context for float");
                Ok(Retrieval::NoContextForFloat(f.float_name.clone()))
            }
            _ => {
                debug!(
                    filtered = filter.is_some(),
                    hits = documents.len(),
                    "context retrieved"
                );
                Ok(Retrieval::Found(RetrievedContext { documents }))
            }
        }
    }
}
