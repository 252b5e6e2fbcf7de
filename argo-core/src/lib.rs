use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use argo_classifier::IntentClassifier;
use argo_context::{ContextRetriever, Retrieval};
use argo_embed::Embedder;
use argo_history::{entry_now, ConversationLog};
use argo_infer::CompletionService;
use argo_sqlgen::SqlSynthesizer;
use argo_store::{ContextStore, RelationalStore};
use argo_summarize::{markdown_table, ResultSummarizer};
use argo_types::{ConversationEntry, QueryRequest, StageParams};
use futures_util::FutureExt;
use tokio::task;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub mod bootstrap;
pub mod messages;

/// Terminal state a request ended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    NotDataRelated,
    NoContextForFloat,
    GenerationFailed,
    ExecutionFailed,
    EmptyResult,
    Answered,
    Unavailable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    /// Always non-empty.
    pub response: String,
    pub outcome: Outcome,
    /// The SQL that was executed, if the request got that far.
    pub sql: Option<String>,
}

impl Resolution {
    fn terminal(outcome: Outcome, response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            outcome,
            sql: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolverSettings {
    pub classify: StageParams,
    pub sql: StageParams,
    pub summary: StageParams,
    pub top_k: usize,
    pub preview_rows: usize,
    pub table_rows: usize,
    /// Append every answered turn to the conversation log.
    pub record_turns: bool,
    pub schema_description: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        let model = "llama-3.1-8b-instant";
        Self {
            classify: StageParams::new(model, 0.0),
            sql: StageParams::new(model, 0.0),
            summary: StageParams::new(model, 0.1),
            top_k: ContextRetriever::DEFAULT_TOP_K,
            preview_rows: ResultSummarizer::DEFAULT_PREVIEW_ROWS,
            table_rows: 10,
            record_turns: false,
            schema_description: argo_schema::schema_description(),
        }
    }
}

/// Turns one user question into one answer. Owns every collaborator it calls;
/// shared read-only across concurrent requests.
pub struct QueryResolver {
    embedder: Arc<dyn Embedder>,
    relational: Arc<dyn RelationalStore>,
    history: Arc<dyn ConversationLog>,
    classifier: IntentClassifier,
    retriever: ContextRetriever,
    synthesizer: SqlSynthesizer,
    summarizer: ResultSummarizer,
    schema_description: String,
    table_rows: usize,
    record_turns: bool,
}

impl QueryResolver {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        embedder: Arc<dyn Embedder>,
        context_store: Arc<dyn ContextStore>,
        relational: Arc<dyn RelationalStore>,
        history: Arc<dyn ConversationLog>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(completion.clone(), settings.classify),
            retriever: ContextRetriever::new(context_store, settings.top_k),
            synthesizer: SqlSynthesizer::new(completion.clone(), settings.sql),
            summarizer: ResultSummarizer::new(completion, settings.summary, settings.preview_rows),
            embedder,
            relational,
            history,
            schema_description: settings.schema_description,
            table_rows: settings.table_rows,
            record_turns: settings.record_turns,
        }
    }

    /// Never fails: internal errors and panics become the unavailable message.
    pub async fn resolve(&self, request: &QueryRequest) -> Resolution {
        let span = info_span!(
            "resolve",
            float = request.selected_float.as_deref().unwrap_or("-")
        );
        let run = AssertUnwindSafe(self.run(request)).catch_unwind();

        match run.instrument(span).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                error!(message = %request.user_message, error = %e, "request failed");
                Resolution::terminal(Outcome::Unavailable, messages::UNAVAILABLE)
            }
            Err(_) => {
                error!(message = %request.user_message, "request panicked");
                Resolution::terminal(Outcome::Unavailable, messages::UNAVAILABLE)
            }
        }
    }

    async fn run(&self, request: &QueryRequest) -> anyhow::Result<Resolution> {
        let question = request.user_message.as_str();

        if !self.classifier.classify(question).await {
            return Ok(Resolution::terminal(Outcome::NotDataRelated, messages::GREETING));
        }

        let embedding = self.embedder.embed(question).await?;
        let filter = request.float_filter();
        let context = match self.retriever.retrieve(&embedding, filter.as_ref()).await? {
            Retrieval::Found(context) => context,
            Retrieval::NoContextForFloat(float) => {
                info!(message = question, float = %float, "no context for selected float");
                return Ok(Resolution::terminal(
                    Outcome::NoContextForFloat,
                    messages::no_context_for_float(&float),
                ));
            }
        };

        let generated = self
            .synthesizer
            .synthesize(question, &self.schema_description, &context.block())
            .await;
        if !generated.is_ok() {
            warn!(message = question, reason = %generated.sql_text, "no usable sql");
            return Ok(Resolution::terminal(Outcome::GenerationFailed, messages::GENERATION_FAILED));
        }
        let sql = generated.sql_text;

        let result = match self.relational.execute(&sql).await {
            Ok(result) => result,
            Err(e) => {
                warn!(message = question, sql = %sql, error = %e, "sql execution failed");
                return Ok(Resolution {
                    response: messages::EXECUTION_FAILED.to_string(),
                    outcome: Outcome::ExecutionFailed,
                    sql: Some(sql),
                });
            }
        };
        if result.is_empty() {
            debug!(sql = %sql, "query returned no rows");
            return Ok(Resolution {
                response: messages::EMPTY_RESULT.to_string(),
                outcome: Outcome::EmptyResult,
                sql: Some(sql),
            });
        }

        let history = self.read_history().await;
        let explanation = self.summarizer.summarize(question, &result, &history).await;
        let response = messages::answer(&explanation, &markdown_table(&result, self.table_rows));

        if self.record_turns {
            self.record(entry_now(question, response.as_str())).await;
        }

        info!(rows = result.len(), "request answered");
        Ok(Resolution {
            response,
            outcome: Outcome::Answered,
            sql: Some(sql),
        })
    }

    // The log may be file-backed; keep its I/O off the async workers.
    async fn read_history(&self) -> Vec<ConversationEntry> {
        let log = self.history.clone();
        match task::spawn_blocking(move || log.entries()).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!(error = %e, "conversation history unreadable; summarizing without it");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "conversation history read aborted");
                Vec::new()
            }
        }
    }

    async fn record(&self, entry: ConversationEntry) {
        let log = self.history.clone();
        match task::spawn_blocking(move || log.append(entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to record conversation turn"),
            Err(e) => warn!(error = %e, "conversation turn write aborted"),
        }
    }
}
