//! Builds the collaborators from configuration, once per process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use argo_config::{AppConfig, EmbedBackend, Stage};
use argo_context::{default_documents, seed_store};
use argo_embed::{Embedder, HashEmbedder, HttpEmbedder};
use argo_history::{ConversationLog, InMemoryConversationLog, JsonlConversationLog};
use argo_infer::{HttpChatEngine, HttpChatSettings};
use argo_store::{
    ContextStore, DataFusionSettings, DataFusionStore, InMemoryContextStore, QdrantContextStore,
};
use tracing::{info, warn};

use crate::{QueryResolver, ResolverSettings};

/// Long-lived handles shared by every request.
pub struct Services {
    pub resolver: Arc<QueryResolver>,
    pub relational: Arc<DataFusionStore>,
    pub history: Arc<dyn ConversationLog>,
}

pub fn resolver_settings(cfg: &AppConfig) -> ResolverSettings {
    ResolverSettings {
        classify: cfg.stage_params(Stage::Classify),
        sql: cfg.stage_params(Stage::Sql),
        summary: cfg.stage_params(Stage::Summary),
        top_k: cfg.context.top_k,
        preview_rows: cfg.summary.preview_rows,
        table_rows: cfg.summary.table_rows,
        record_turns: cfg.history.record_turns,
        schema_description: argo_schema::schema_description(),
    }
}

pub fn build_embedder(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    let e = &cfg.embedding;
    let embedder: Arc<dyn Embedder> = match e.backend {
        EmbedBackend::Hash => Arc::new(HashEmbedder::new(e.dim)),
        EmbedBackend::Http => {
            let url = e
                .url
                .clone()
                .context("embedding.backend=http needs embedding.url")?;
            Arc::new(HttpEmbedder::new(
                url,
                e.model.clone(),
                e.dim,
                Duration::from_millis(e.timeout_ms),
            )?)
        }
    };
    Ok(embedder)
}

pub fn build_history(cfg: &AppConfig) -> Arc<dyn ConversationLog> {
    let log: Arc<dyn ConversationLog> = match &cfg.history.path {
        Some(path) => Arc::new(JsonlConversationLog::open(path)),
        None => Arc::new(InMemoryConversationLog::new()),
    };
    log
}

fn qdrant(cfg: &AppConfig, url: &str) -> anyhow::Result<QdrantContextStore> {
    Ok(QdrantContextStore::new(
        url,
        cfg.context.collection.clone(),
        Duration::from_millis(cfg.context.timeout_ms),
    )?)
}

/// Qdrant when configured; otherwise an in-memory index holding the default documents.
pub async fn build_context_store(
    cfg: &AppConfig,
    embedder: &dyn Embedder,
) -> anyhow::Result<Arc<dyn ContextStore>> {
    if let Some(url) = &cfg.context.qdrant_url {
        info!(url = %url, collection = %cfg.context.collection, "using qdrant context store");
        return Ok(Arc::new(qdrant(cfg, url)?));
    }
    let store = InMemoryContextStore::new();
    let written = seed_store(&store, embedder, default_documents()).await?;
    info!(documents = written, "using in-memory context store");
    Ok(Arc::new(store))
}

/// Write the default documents into the configured context store.
pub async fn seed(cfg: &AppConfig) -> anyhow::Result<usize> {
    let embedder = build_embedder(cfg)?;
    let Some(url) = &cfg.context.qdrant_url else {
        warn!("no qdrant url configured; the in-memory store is seeded at every startup");
        return Ok(0);
    };
    let store = qdrant(cfg, url)?;
    store
        .ensure_collection(embedder.dim())
        .await
        .context("create qdrant collection")?;
    let written = seed_store(&store, embedder.as_ref(), default_documents()).await?;
    info!(documents = written, collection = %cfg.context.collection, "context store seeded");
    Ok(written)
}

pub async fn open_relational(cfg: &AppConfig) -> anyhow::Result<DataFusionStore> {
    let settings = DataFusionSettings {
        data_dir: cfg.database.data_dir.clone(),
        max_connections: cfg.database.max_connections,
        query_timeout: Duration::from_millis(cfg.database.query_timeout_ms),
        retry: cfg.database.retry.policy(),
    };
    let store = DataFusionStore::open(settings)
        .await
        .with_context(|| format!("open tables in {}", cfg.database.data_dir.display()))?;
    if store.tables().is_empty() {
        warn!(data_dir = %cfg.database.data_dir.display(), "no telemetry tables found");
    }
    Ok(store)
}

pub async fn bootstrap(cfg: &AppConfig) -> anyhow::Result<Services> {
    if cfg.completion.api_key.is_none() {
        warn!("no completion api key configured; requests may be refused upstream");
    }
    let completion = Arc::new(HttpChatEngine::new(HttpChatSettings {
        base_url: cfg.completion.base_url.clone(),
        api_key: cfg.completion.api_key.clone(),
        timeout: cfg.completion.timeout(),
        retry: cfg.completion.retry.policy(),
    })?);
    let embedder = build_embedder(cfg)?;
    let context_store = build_context_store(cfg, embedder.as_ref()).await?;
    let relational = Arc::new(open_relational(cfg).await?);
    let history = build_history(cfg);

    let resolver = QueryResolver::new(
        completion,
        embedder,
        context_store,
        relational.clone(),
        history.clone(),
        resolver_settings(cfg),
    );
    Ok(Services {
        resolver: Arc::new(resolver),
        relational,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.summary.table_rows = 3;
        cfg.history.record_turns = true;
        let s = resolver_settings(&cfg);
        assert_eq!(s.table_rows, 3);
        assert!(s.record_turns);
        assert_eq!(s.summary.temperature, 0.1);
        assert!(s.schema_description.contains("argo_profiles"));
    }

    #[tokio::test]
    async fn default_context_store_is_seeded_in_memory() {
        let cfg = AppConfig::default();
        let embedder = build_embedder(&cfg).unwrap();
        let store = build_context_store(&cfg, embedder.as_ref()).await.unwrap();
        let query = embedder.embed("lowest pressure").await.unwrap();
        let hits = store.search(&query, 4, None).await.unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[tokio::test]
    async fn qdrant_store_is_built_without_contacting_it() {
        let mut cfg = AppConfig::default();
        cfg.context.qdrant_url = Some("http://127.0.0.1:6333".into());
        cfg.context.timeout_ms = 250;
        let embedder = build_embedder(&cfg).unwrap();
        assert!(build_context_store(&cfg, embedder.as_ref()).await.is_ok());
    }

    #[test]
    fn http_embedder_without_url_is_an_error() {
        let mut cfg = AppConfig::default();
        cfg.embedding.backend = EmbedBackend::Http;
        assert!(build_embedder(&cfg).is_err());
    }
}
