use std::sync::Arc;

use argo_infer::CompletionService;
use argo_types::{ConversationEntry, ResultSet, StageParams};
use tracing::warn;

pub mod render;
pub use render::{markdown_table, preview_table, transcript};

/// Filler used when the summary call fails; the data table is still returned.
pub const FALLBACK_SUMMARY: &str = "Here is the data I found.";

#[derive(Clone, Debug)]
pub struct SummaryPrompt<'a> {
    pub history: &'a str,
    pub query: &'a str,
    pub preview: &'a str,
}

impl SummaryPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            r#"You are an expert data analyst who writes natural language summaries of data tables.

Here is the conversation history so far:
{history}

The user just asked: "{query}"

The data table below contains the complete answer:
Data:
{preview}

Your task is to write a single, helpful sentence that directly answers the user's question based on the data.

# --- EXAMPLES ---
# User Question: "give me the highest 5 temperature reading of this float"
# Good Summary: "The top 5 temperature readings range from 30.297 to 29.833."

# User Question: "what is the lowest pressure?"
# Good Summary: "The lowest pressure reading is 8.0 decibars."

# User Question: "show me some salinity and temperature values"
# Good Summary: "Here are some recent salinity and temperature readings from the float."
# --- END EXAMPLES ---

Based on the conversation history, the user's latest question, and the data provided, what is the best one-sentence summary?

Summary:"#,
            history = self.history,
            query = self.query,
            preview = self.preview,
        )
    }
}

pub struct ResultSummarizer {
    completion: Arc<dyn CompletionService>,
    params: StageParams,
    preview_rows: usize,
}

impl ResultSummarizer {
    pub const DEFAULT_PREVIEW_ROWS: usize = 50;

    pub fn new(completion: Arc<dyn CompletionService>, params: StageParams, preview_rows: usize) -> Self {
        Self {
            completion,
            params,
            preview_rows,
        }
    }

    /// One-sentence explanation of `result`. Never fails.
    pub async fn summarize(
        &self,
        query: &str,
        result: &ResultSet,
        history: &[ConversationEntry],
    ) -> String {
        let history = transcript(history);
        let preview = preview_table(result, self.preview_rows);
        let prompt = SummaryPrompt {
            history: &history,
            query,
            preview: &preview,
        }
        .render();

        match self.completion.complete(self.params.request(prompt)).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(query, error = %e, "summarization failed; using filler sentence");
                FALLBACK_SUMMARY.to_string()
            }
        }
    }
}
