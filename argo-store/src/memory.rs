use std::cmp::Ordering;

use argo_embed::cosine_similarity;
use argo_types::{ContextDocument, FloatFilter};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{ContextStore, DataError, IndexedDocument};

/// Brute-force in-memory context index.
///
/// Used when no Qdrant endpoint is configured and as the index in tests. Not durable.
pub struct InMemoryContextStore {
    docs: RwLock<Vec<IndexedDocument>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<&FloatFilter>,
    ) -> Result<Vec<ContextDocument>, DataError> {
        let docs = self.docs.read().await;
        let mut scored: Vec<(f32, &IndexedDocument)> = docs
            .iter()
            .filter(|d| filter.map_or(true, |f| f.matches(&d.document)))
            .map(|d| (cosine_similarity(query_embedding, &d.embedding), d))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, d)| d.document.clone())
            .collect())
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<(), DataError> {
        let mut docs = self.docs.write().await;
        for doc in documents {
            match docs.iter_mut().find(|d| d.document.id == doc.document.id) {
                Some(existing) => *existing = doc,
                None => docs.push(doc),
            }
        }
        Ok(())
    }
}
