use std::sync::Arc;

use argo_infer::CompletionService;
use argo_types::StageParams;
use tracing::{info, warn};

/// Prompt asking whether the float database can answer a question.
#[derive(Clone, Debug)]
pub struct ClassificationPrompt<'a> {
    pub query: &'a str,
}

impl ClassificationPrompt<'_> {
    pub fn render(&self) -> String {
        format!(
            r#"You are an intent classification assistant for a database chatbot.
The database contains oceanographic data about Argo floats.
Determine if the user's query can be answered by this database.
- If the query is about ocean data, measurements, locations, etc., respond with ONLY "yes".
- If it's a greeting or unrelated, respond with ONLY "no".
User Query: "{}"
Your response (yes/no):"#,
            self.query
        )
    }
}

/// Exact "yes" after trimming and lower-casing; anything else is "no".
pub fn parse_verdict(response: &str) -> bool {
    response.trim().to_lowercase() == "yes"
}

/// Decides whether a question goes down the data path. Fails closed.
pub struct IntentClassifier {
    completion: Arc<dyn CompletionService>,
    params: StageParams,
}

impl IntentClassifier {
    pub fn new(completion: Arc<dyn CompletionService>, params: StageParams) -> Self {
        Self { completion, params }
    }

    pub async fn classify(&self, query: &str) -> bool {
        let prompt = ClassificationPrompt { query }.render();
        match self.completion.complete(self.params.request(prompt)).await {
            Ok(response) => {
                let related = parse_verdict(&response);
                info!(query, response = %response.trim(), related, "intent classified");
                related
            }
            Err(e) => {
                warn!(query, error = %e, "intent classification failed; treating as not data related");
                false
            }
        }
    }
}
