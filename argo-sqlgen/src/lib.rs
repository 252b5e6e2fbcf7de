use std::sync::Arc;

use argo_infer::CompletionService;
use argo_types::{GeneratedQuery, StageParams};
use tracing::{info, warn};

pub mod extract;
pub use extract::{extract_select, validate_read_only, SqlRejection};

/// Prompt for turning a question into one PostgreSQL-flavoured SELECT.
#[derive(Clone, Debug)]
pub struct SynthesisPrompt<'a> {
    pub schema: &'a str,
    pub context: &'a str,
    pub query: &'a str,
}

impl SynthesisPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            r#"You are an expert PostgreSQL assistant. Your task is to generate a SQL query based on the user's question and the provided database context.
You must only output the SQL query and nothing else.
When the user says this float which means kokan coast float.
IMPORTANT: Always enclose table and column names in double quotes (e.g., SELECT "my_column" FROM "my_table").

Here is the database schema:
{schema}

Here is some context about the tables which might be relevant:
{context}

User's Question:
"{query}"

SQL Query:"#,
            schema = self.schema,
            context = self.context,
            query = self.query,
        )
    }
}

pub struct SqlSynthesizer {
    completion: Arc<dyn CompletionService>,
    params: StageParams,
}

impl SqlSynthesizer {
    pub fn new(completion: Arc<dyn CompletionService>, params: StageParams) -> Self {
        Self { completion, params }
    }

    /// Ask the model for SQL and keep only a validated read-only SELECT.
    ///
    /// Completion errors and rejected output both yield `GenerationFailed` with the
    /// reason in `sql_text`.
    pub async fn synthesize(&self, query: &str, schema: &str, context: &str) -> GeneratedQuery {
        let prompt = SynthesisPrompt {
            schema,
            context,
            query,
        }
        .render();

        let raw = match self.completion.complete(self.params.request(prompt)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(query, error = %e, "sql generation call failed");
                return GeneratedQuery::failed(format!("Failed to generate SQL: {e}"), query);
            }
        };

        match extract_select(raw.trim()) {
            Ok(sql) => {
                info!(query, sql = %sql, "sql generated");
                GeneratedQuery::ok(sql, query)
            }
            Err(rejection) => {
                warn!(query, raw = %raw, reason = %rejection, "generated sql rejected");
                GeneratedQuery::failed(format!("Rejected generated SQL: {rejection}"), query)
            }
        }
    }
}
