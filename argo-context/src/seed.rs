//! Default schema-context documents and the routine that writes them into an index.

use argo_embed::{EmbedError, Embedder};
use argo_store::{ContextStore, DataError, IndexedDocument};
use argo_types::ContextDocument;
use thiserror::Error;
use tracing::info;

pub const KONKAN_COAST_FLOAT: &str = "Konkan Coast Float";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] DataError),
}

const DOCUMENTS: [(&str, &str); 4] = [
    (
        "argo_trajectory",
        "Konkan Coast ARGO Data: The 'argo_trajectory' table contains location data for the ARGO float deployed along the Konkan Coast, including latitude and longitude for each measurement point, showing its path.",
    ),
    (
        "argo_profiles",
        "Konkan Coast ARGO Data: The 'argo_profiles' table holds the scientific oceanographic measurements collected by the Konkan Coast floats. It includes columns for pressure (PRES), temperature (TEMP), and salinity (PSAL) at various depths.",
    ),
    (
        "argo_technical",
        "Konkan Coast ARGO Data: The 'argo_technical' table contains operational logs and technical parameters for the Konkan Coast ARGO float. This includes information about cycle numbers, data transmission, and system health checks.",
    ),
    (
        "argo_metadata",
        "Konkan Coast ARGO Data: The 'argo_metadata' table contains static identification and configuration details for the Konkan Coast float. This includes information like the float's serial number, project name, PI name, launch date, and sensor types.",
    ),
];

/// One document per telemetry table, all tagged with the Konkan Coast float.
pub fn default_documents() -> Vec<ContextDocument> {
    DOCUMENTS
        .iter()
        .enumerate()
        .map(|(i, (table, text))| ContextDocument {
            id: format!("doc_{}", i + 1),
            text: (*text).to_string(),
            table_name: (*table).to_string(),
            float_name: Some(KONKAN_COAST_FLOAT.to_string()),
        })
        .collect()
}

/// Embed `documents` and upsert them into `store`. Returns the number written.
pub async fn seed_store(
    store: &dyn ContextStore,
    embedder: &dyn Embedder,
    documents: Vec<ContextDocument>,
) -> Result<usize, SeedError> {
    let mut indexed = Vec::with_capacity(documents.len());
    for document in documents {
        let embedding = embedder.embed(&document.text).await?;
        indexed.push(IndexedDocument {
            document,
            embedding,
        });
    }
    let n = indexed.len();
    store.upsert(indexed).await?;
    info!(documents = n, "context index seeded");
    Ok(n)
}
