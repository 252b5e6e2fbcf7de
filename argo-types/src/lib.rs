use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Short schema-description document held by the context store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub id: String,
    pub text: String,
    pub table_name: String,
    #[serde(default)]
    pub float_name: Option<String>,
}

/// Narrows context retrieval to documents tagged with one float.
///
/// Never applied to SQL: float scoping in queries is whatever the model writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloatFilter {
    pub float_name: String,
}

impl FloatFilter {
    pub fn new(float_name: impl Into<String>) -> Self {
        Self {
            float_name: float_name.into(),
        }
    }

    pub fn matches(&self, doc: &ContextDocument) -> bool {
        doc.float_name.as_deref() == Some(self.float_name.as_str())
    }
}

/// One inbound question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub user_message: String,
    #[serde(default)]
    pub selected_float: Option<String>,
}

impl QueryRequest {
    pub fn new(user_message: impl Into<String>, selected_float: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            selected_float,
        }
    }

    /// Filter derived from the selected float; blank selections count as none.
    pub fn float_filter(&self) -> Option<FloatFilter> {
        self.selected_float
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(FloatFilter::new)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Ok,
    NoContext,
    GenerationFailed,
    ExecutionFailed,
}

/// SQL produced for one request. On `GenerationFailed` the text carries the
/// failure description instead of SQL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub sql_text: String,
    pub source_query: String,
    pub status: QueryStatus,
}

impl GeneratedQuery {
    pub fn ok(sql_text: impl Into<String>, source_query: impl Into<String>) -> Self {
        Self {
            sql_text: sql_text.into(),
            source_query: source_query.into(),
            status: QueryStatus::Ok,
        }
    }

    pub fn failed(reason: impl Into<String>, source_query: impl Into<String>) -> Self {
        Self {
            sql_text: reason.into(),
            source_query: source_query.into(),
            status: QueryStatus::GenerationFailed,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == QueryStatus::Ok
    }
}

/// A single cell of a result row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            // Keep a trailing ".0" on whole floats so 8.0 decibars does not print as 8.
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{x:.1}")
            }
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered rows returned by the relational store. Zero rows is a valid answer,
/// distinct from an execution error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Look up a cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Rows as (column, value) pairs in column order.
    pub fn iter_rows(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }
}

/// One finished turn of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: String,
    pub user_message: String,
    pub ai_response: String,
}

/// Single completion call handed to the completion service.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Model and sampling temperature for one pipeline stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageParams {
    pub model: String,
    pub temperature: f32,
}

impl StageParams {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }

    pub fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            prompt,
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: None,
        }
    }
}

/// Retry schedule for an external collaborator: `max_retries` extra attempts,
/// doubling `backoff` after each one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff: Duration::ZERO,
    };

    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}
