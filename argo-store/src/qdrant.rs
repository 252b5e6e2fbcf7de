use std::time::Duration;

use argo_types::{ContextDocument, FloatFilter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{ContextStore, DataError, IndexedDocument};

/// Qdrant-backed context store, spoken to over its REST API.
pub struct QdrantContextStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl QdrantContextStore {
    /// `timeout` bounds every REST call, connect included.
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::new(format!("qdrant client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Create the collection with cosine distance if it does not exist yet.
    pub async fn ensure_collection(&self, dim: usize) -> Result<(), DataError> {
        let url = self.collection_url();
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DataError::new(format!("qdrant request error: {e}")))?;
        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::new(format!("qdrant status: {}", resp.status())));
        }

        let body = serde_json::json!({
            "vectors": { "size": dim, "distance": "Cosine" }
        });
        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DataError::new(format!("qdrant create error: {e}")))?;
        if !resp.status().is_success() {
            return Err(DataError::new(format!(
                "qdrant create status: {}",
                resp.status()
            )));
        }
        info!(collection = %self.collection, dim, "created qdrant collection");
        Ok(())
    }
}

/// Point ids must be integers or UUIDs; derive a stable UUID from the document id.
pub fn point_id(doc_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, doc_id.as_bytes())
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

fn float_condition(filter: &FloatFilter) -> serde_json::Value {
    serde_json::json!({
        "must": [
            { "key": "float_name", "match": { "value": filter.float_name } }
        ]
    })
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    result: Vec<SearchResult>,
}

#[derive(Deserialize, Debug)]
struct SearchResult {
    #[serde(default)]
    payload: Payload,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Payload {
    #[serde(default)]
    doc_id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    table_name: String,
    #[serde(default)]
    float_name: Option<String>,
}

#[derive(Serialize)]
struct UpsertPoint {
    id: Uuid,
    vector: Vec<f32>,
    payload: Payload,
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<UpsertPoint>,
}

fn into_documents(parsed: SearchResponse) -> Vec<ContextDocument> {
    parsed
        .result
        .into_iter()
        .filter_map(|item| {
            let p = item.payload;
            Some(ContextDocument {
                id: p.doc_id,
                text: p.text?,
                table_name: p.table_name,
                float_name: p.float_name,
            })
        })
        .collect()
}

#[async_trait]
impl ContextStore for QdrantContextStore {
    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<&FloatFilter>,
    ) -> Result<Vec<ContextDocument>, DataError> {
        let url = format!("{}/points/search", self.collection_url());
        let body = SearchRequest {
            vector: query_embedding,
            limit: top_k,
            with_payload: true,
            filter: filter.map(float_condition),
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DataError::new(format!("qdrant request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(DataError::new(format!("qdrant status: {}", resp.status())));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| DataError::new(format!("qdrant parse error: {e}")))?;

        let docs = into_documents(parsed);
        debug!(collection = %self.collection, hits = docs.len(), "qdrant search");
        Ok(docs)
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<(), DataError> {
        if documents.is_empty() {
            return Ok(());
        }
        let points = documents
            .into_iter()
            .map(|d| UpsertPoint {
                id: point_id(&d.document.id),
                vector: d.embedding,
                payload: Payload {
                    doc_id: d.document.id,
                    text: Some(d.document.text),
                    table_name: d.document.table_name,
                    float_name: d.document.float_name,
                },
            })
            .collect();

        let url = format!("{}/points?wait=true", self.collection_url());
        let resp = self
            .client
            .put(&url)
            .json(&UpsertRequest { points })
            .send()
            .await
            .map_err(|e| DataError::new(format!("qdrant upsert error: {e}")))?;
        if !resp.status().is_success() {
            return Err(DataError::new(format!(
                "qdrant upsert status: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_search_body_matches_on_float_name() {
        let filter = FloatFilter::new("Konkan Coast Float");
        let body = SearchRequest {
            vector: &[0.5, 0.5],
            limit: 2,
            with_payload: true,
            filter: Some(float_condition(&filter)),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["limit"], 2);
        assert_eq!(
            json["filter"]["must"][0]["match"]["value"],
            "Konkan Coast Float"
        );
        assert_eq!(json["filter"]["must"][0]["key"], "float_name");
    }

    #[test]
    fn unfiltered_search_body_omits_filter() {
        let body = SearchRequest {
            vector: &[1.0],
            limit: 2,
            with_payload: true,
            filter: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("filter").is_none());
    }

    #[test]
    fn results_keep_rank_order_and_skip_textless_points() {
        let raw = r#"{"result":[
            {"id":"x","score":0.9,"payload":{"doc_id":"doc_2","text":"profiles","table_name":"argo_profiles","float_name":"Konkan Coast Float"}},
            {"id":"y","score":0.5,"payload":{}},
            {"id":"z","score":0.4,"payload":{"doc_id":"doc_1","text":"trajectory","table_name":"argo_trajectory"}}
        ],"status":"ok","time":0.001}"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        let docs = into_documents(parsed);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "doc_2");
        assert_eq!(docs[1].float_name, None);
    }

    #[test]
    fn point_ids_are_stable() {
        assert_eq!(point_id("doc_1"), point_id("doc_1"));
        assert_ne!(point_id("doc_1"), point_id("doc_2"));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let store =
            QdrantContextStore::new(format!("http://{addr}"), "argo", Duration::from_millis(200)).unwrap();
        let out = tokio::time::timeout(Duration::from_secs(5), store.search(&[1.0], 2, None))
            .await
            .expect("search should give up on its own");
        assert!(out.is_err());
    }
}
