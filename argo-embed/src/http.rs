use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{EmbedError, Embedder};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Encoder served over an OpenAI-compatible `/embeddings` endpoint
/// (text-embeddings-inference, Ollama, vLLM, ...).
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
}

impl HttpEmbedder {
    /// `timeout` bounds each embedding call, connect included.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dim: usize,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            dim,
        })
    }
}

fn first_embedding(resp: EmbeddingResponse, dim: usize) -> Result<Vec<f32>, EmbedError> {
    let v = resp
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbedError::Response("no embedding returned".into()))?;
    if v.len() != dim {
        return Err(EmbedError::DimMismatch {
            expected: dim,
            actual: v.len(),
        });
    }
    Ok(v)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(EmbedError::Request(format!("status {}", resp.status())));
        }
        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Response(e.to_string()))?;
        first_embedding(parsed, self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_embedding_and_checks_dim() {
        let resp: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[0.1,0.2,0.3]}],"model":"m"}"#).unwrap();
        assert_eq!(first_embedding(resp, 3).unwrap(), vec![0.1, 0.2, 0.3]);

        let resp: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[0.1]}]}"#).unwrap();
        assert!(matches!(
            first_embedding(resp, 3),
            Err(EmbedError::DimMismatch { expected: 3, actual: 1 })
        ));

        let resp: EmbeddingResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(matches!(first_embedding(resp, 3), Err(EmbedError::Response(_))));
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let embedder =
            HttpEmbedder::new(format!("http://{addr}/v1"), "m", 3, Duration::from_millis(200)).unwrap();
        let out = tokio::time::timeout(Duration::from_secs(5), embedder.embed("salinity"))
            .await
            .expect("embed call should give up on its own");
        assert!(matches!(out, Err(EmbedError::Request(_))));
    }
}
