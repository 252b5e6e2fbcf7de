use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use argo_context::{default_documents, seed_store, KONKAN_COAST_FLOAT};
use argo_core::{messages, Outcome, QueryResolver, ResolverSettings};
use argo_embed::{EmbedError, Embedder, HashEmbedder};
use argo_history::{ConversationLog, InMemoryConversationLog, JsonlConversationLog};
use argo_infer::{CompletionService, LlmError};
use argo_store::{
    DataFusionSettings, DataFusionStore, ExecutionError, InMemoryContextStore, RelationalStore,
};
use argo_types::{CompletionRequest, ConversationEntry, QueryRequest, ResultSet, Value};
use async_trait::async_trait;

/// Answers each pipeline stage from a fixed script, keyed on the prompt shape.
#[derive(Default)]
struct ScriptedModel {
    classify: Option<&'static str>,
    sql: Option<&'static str>,
    summary: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedModel {
    async fn complete(&self, req: CompletionRequest) -> Result<String, LlmError> {
        let reply = if req.prompt.ends_with("Your response (yes/no):") {
            self.classify
        } else if req.prompt.ends_with("SQL Query:") {
            self.sql
        } else if req.prompt.ends_with("Summary:") {
            self.summary
        } else {
            panic!("unexpected prompt: {}", req.prompt);
        };
        self.prompts.lock().unwrap().push(req.prompt);
        reply
            .map(str::to_string)
            .ok_or_else(|| LlmError::Status { status: 503, body: "overloaded".into() })
    }
}

struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }
}

/// Relational store that returns a canned outcome and counts calls.
struct CannedTables {
    outcome: fn() -> Result<ResultSet, ExecutionError>,
    calls: AtomicUsize,
}

#[async_trait]
impl RelationalStore for CannedTables {
    async fn execute(&self, _sql: &str) -> Result<ResultSet, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

struct PanickingTables;

#[async_trait]
impl RelationalStore for PanickingTables {
    async fn execute(&self, _sql: &str) -> Result<ResultSet, ExecutionError> {
        panic!("driver bug");
    }
}

struct Harness {
    model: Arc<ScriptedModel>,
    embedder: Arc<CountingEmbedder>,
    history: Arc<InMemoryConversationLog>,
    resolver: QueryResolver,
}

async fn harness(
    model: ScriptedModel,
    tables: Arc<dyn RelationalStore>,
    settings: ResolverSettings,
) -> Harness {
    let model = Arc::new(model);
    let embedder = Arc::new(CountingEmbedder {
        inner: HashEmbedder::new(64),
        calls: AtomicUsize::new(0),
    });
    let context = Arc::new(InMemoryContextStore::new());
    seed_store(context.as_ref(), &embedder.inner, default_documents())
        .await
        .unwrap();
    let history = Arc::new(InMemoryConversationLog::new());
    let resolver = QueryResolver::new(
        model.clone(),
        embedder.clone(),
        context,
        tables,
        history.clone(),
        settings,
    );
    Harness {
        model,
        embedder,
        history,
        resolver,
    }
}

fn canned(outcome: fn() -> Result<ResultSet, ExecutionError>) -> Arc<CannedTables> {
    Arc::new(CannedTables {
        outcome,
        calls: AtomicUsize::new(0),
    })
}

fn one_row() -> Result<ResultSet, ExecutionError> {
    let mut rs = ResultSet::new(vec!["TEMP".into()]);
    rs.push_row(vec![Value::Float(30.297)]);
    Ok(rs)
}

fn no_rows() -> Result<ResultSet, ExecutionError> {
    Ok(ResultSet::new(vec!["TEMP".into()]))
}

fn broken() -> Result<ResultSet, ExecutionError> {
    Err(ExecutionError::Sql("column \"TEMPERATURE\" not found".into()))
}

fn data_model() -> ScriptedModel {
    ScriptedModel {
        classify: Some("yes"),
        sql: Some("SELECT \"TEMP\" FROM \"argo_profiles\" LIMIT 1;"),
        summary: Some("The warmest reading is 30.297 degrees."),
        ..Default::default()
    }
}

fn profiles_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("argo_profiles.csv"),
        "N_MEASUREMENT,PRES,TEMP,PSAL\n0,8.0,30.297,35.1\n1,12.5,29.833,35.2\n2,20.0,28.5,35.4\n",
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn greeting_skips_the_data_path() {
    let tables = canned(one_row);
    let h = harness(
        ScriptedModel {
            classify: Some("No"),
            ..Default::default()
        },
        tables.clone(),
        ResolverSettings::default(),
    )
    .await;

    let out = h.resolver.resolve(&QueryRequest::new("hello", None)).await;
    assert_eq!(out.outcome, Outcome::NotDataRelated);
    assert_eq!(out.response, messages::GREETING);
    assert_eq!(h.model.calls(), 1);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(tables.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn classifier_outage_fails_closed() {
    let tables = canned(one_row);
    let h = harness(ScriptedModel::default(), tables.clone(), ResolverSettings::default()).await;
    let out = h
        .resolver
        .resolve(&QueryRequest::new("show me temperature readings", None))
        .await;
    assert_eq!(out.response, messages::GREETING);
    assert_eq!(tables.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_float_stops_before_synthesis() {
    let tables = canned(one_row);
    let h = harness(data_model(), tables.clone(), ResolverSettings::default()).await;

    let out = h
        .resolver
        .resolve(&QueryRequest::new(
            "show me temperature readings",
            Some("Unknown Float".into()),
        ))
        .await;
    assert_eq!(out.outcome, Outcome::NoContextForFloat);
    assert!(out.response.contains("'Unknown Float'"));
    assert!(out.response.starts_with("I'm sorry"));
    // classification only
    assert_eq!(h.model.calls(), 1);
    assert_eq!(tables.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn konkan_lowest_pressure_end_to_end() {
    let dir = profiles_dir();
    let tables = DataFusionStore::open(DataFusionSettings {
        data_dir: dir.path().to_path_buf(),
        ..DataFusionSettings::default()
    })
    .await
    .unwrap();
    let h = harness(
        ScriptedModel {
            classify: Some("yes"),
            sql: Some("Sure! Here it is:\nselect MIN(\"PRES\") from \"argo_profiles\"; -- lowest"),
            summary: Some("The lowest pressure reading is 8.0 decibars."),
            ..Default::default()
        },
        Arc::new(tables),
        ResolverSettings::default(),
    )
    .await;

    let out = h
        .resolver
        .resolve(&QueryRequest::new(
            "lowest pressure for Konkan Coast Float",
            Some(KONKAN_COAST_FLOAT.into()),
        ))
        .await;

    assert_eq!(out.outcome, Outcome::Answered);
    assert_eq!(
        out.sql.as_deref(),
        Some("select MIN(\"PRES\") from \"argo_profiles\";")
    );
    assert!(out
        .response
        .starts_with("The lowest pressure reading is 8.0 decibars.\n\nData I found:\n<pre>| "));
    assert!(out.response.ends_with("</pre>"));
    assert!(out.response.contains("8.0 |"));

    let sql_prompt = h.model.prompt(1);
    assert!(sql_prompt.contains("Table \"argo_profiles\": Columns -> \"N_MEASUREMENT\", \"PRES\""));
    assert!(sql_prompt.contains("Konkan Coast ARGO Data"));
    let summary_prompt = h.model.prompt(2);
    assert!(summary_prompt.contains("8.0"));
}

#[tokio::test]
async fn identical_requests_get_identical_answers() {
    let h = harness(data_model(), canned(one_row), ResolverSettings::default()).await;
    let req = QueryRequest::new("warmest reading", Some(KONKAN_COAST_FLOAT.into()));
    let first = h.resolver.resolve(&req).await;
    let second = h.resolver.resolve(&req).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn empty_result_and_execution_error_are_worded_differently() {
    let req = QueryRequest::new("temperatures below the seabed", None);

    let empty = harness(data_model(), canned(no_rows), ResolverSettings::default()).await;
    let empty = empty.resolver.resolve(&req).await;
    assert_eq!(empty.outcome, Outcome::EmptyResult);
    assert_eq!(empty.response, messages::EMPTY_RESULT);

    let failed = harness(data_model(), canned(broken), ResolverSettings::default()).await;
    let failed = failed.resolver.resolve(&req).await;
    assert_eq!(failed.outcome, Outcome::ExecutionFailed);
    assert_eq!(failed.response, messages::EXECUTION_FAILED);

    assert_ne!(empty.response, failed.response);
}

#[tokio::test]
async fn prose_without_select_is_a_generation_failure() {
    let tables = canned(one_row);
    let h = harness(
        ScriptedModel {
            classify: Some("yes"),
            sql: Some("I'm not able to answer that from these tables."),
            ..Default::default()
        },
        tables.clone(),
        ResolverSettings::default(),
    )
    .await;
    let out = h.resolver.resolve(&QueryRequest::new("why is the sea salty", None)).await;
    assert_eq!(out.outcome, Outcome::GenerationFailed);
    assert_eq!(out.response, messages::GENERATION_FAILED);
    assert_eq!(tables.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn write_statements_never_reach_the_store() {
    let tables = canned(one_row);
    let h = harness(
        ScriptedModel {
            classify: Some("yes"),
            sql: Some("SELECT 1; DROP TABLE \"argo_profiles\";"),
            ..Default::default()
        },
        tables.clone(),
        ResolverSettings::default(),
    )
    .await;
    let out = h.resolver.resolve(&QueryRequest::new("anything", None)).await;
    // truncation at the first ';' leaves only the SELECT
    assert_eq!(out.sql.as_deref(), Some("SELECT 1;"));
    assert_eq!(tables.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn summary_outage_still_returns_the_table() {
    let h = harness(
        ScriptedModel {
            summary: None,
            ..data_model()
        },
        canned(one_row),
        ResolverSettings::default(),
    )
    .await;
    let out = h.resolver.resolve(&QueryRequest::new("warmest reading", None)).await;
    assert_eq!(out.outcome, Outcome::Answered);
    assert!(out.response.starts_with("Here is the data I found.\n\nData I found:\n<pre>"));
    assert!(out.response.contains("30.297"));
}

#[tokio::test]
async fn history_feeds_the_summary_and_records_when_enabled() {
    let settings = ResolverSettings {
        record_turns: true,
        ..ResolverSettings::default()
    };
    let h = harness(data_model(), canned(one_row), settings).await;
    h.history
        .append(ConversationEntry {
            timestamp: "2025-01-01T00:00:00Z".into(),
            user_message: "where is the float".into(),
            ai_response: "Off the Konkan coast.".into(),
        })
        .unwrap();

    let out = h.resolver.resolve(&QueryRequest::new("warmest reading", None)).await;
    assert!(h
        .model
        .prompt(2)
        .contains("User: where is the float\nAssistant: Off the Konkan coast."));

    let entries = h.history.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].user_message, "warmest reading");
    assert_eq!(entries[1].ai_response, out.response);
}

#[tokio::test]
async fn turns_are_not_recorded_by_default() {
    let h = harness(data_model(), canned(one_row), ResolverSettings::default()).await;
    h.resolver.resolve(&QueryRequest::new("warmest reading", None)).await;
    assert!(h.history.entries().unwrap().is_empty());
}

#[tokio::test]
async fn panics_become_the_unavailable_message() {
    let h = harness(data_model(), Arc::new(PanickingTables), ResolverSettings::default()).await;
    let out = h.resolver.resolve(&QueryRequest::new("warmest reading", None)).await;
    assert_eq!(out.outcome, Outcome::Unavailable);
    assert_eq!(out.response, messages::UNAVAILABLE);
    assert!(!out.response.contains("driver bug"));
}

struct UnreachableEmbedder;

#[async_trait]
impl Embedder for UnreachableEmbedder {
    fn dim(&self) -> usize {
        64
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Request("connect to 10.0.0.7:8080 refused".into()))
    }
}

#[tokio::test]
async fn collaborator_errors_become_the_unavailable_message() {
    let model = Arc::new(data_model());
    let tables = canned(one_row);
    let resolver = QueryResolver::new(
        model.clone(),
        Arc::new(UnreachableEmbedder),
        Arc::new(InMemoryContextStore::new()),
        tables.clone(),
        Arc::new(InMemoryConversationLog::new()),
        ResolverSettings::default(),
    );

    let out = resolver
        .resolve(&QueryRequest::new("warmest reading", Some(KONKAN_COAST_FLOAT.into())))
        .await;
    assert_eq!(out.outcome, Outcome::Unavailable);
    assert_eq!(out.response, messages::UNAVAILABLE);
    assert!(!out.response.contains("10.0.0.7"));
    assert!(!out.response.contains("refused"));
    assert_eq!(out.sql, None);
    // classification only; nothing after the failed embedding ran
    assert_eq!(model.calls(), 1);
    assert_eq!(tables.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_history_is_read_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    let log = Arc::new(JsonlConversationLog::open(&path));
    log.append(ConversationEntry {
        timestamp: "2025-01-01T00:00:00Z".into(),
        user_message: "where is the float".into(),
        ai_response: "Off the Konkan coast.".into(),
    })
    .unwrap();

    let model = Arc::new(data_model());
    let embedder = HashEmbedder::new(64);
    let context = Arc::new(InMemoryContextStore::new());
    seed_store(context.as_ref(), &embedder, default_documents())
        .await
        .unwrap();
    let resolver = QueryResolver::new(
        model.clone(),
        Arc::new(embedder),
        context,
        canned(one_row),
        log.clone(),
        ResolverSettings {
            record_turns: true,
            ..ResolverSettings::default()
        },
    );

    let out = resolver.resolve(&QueryRequest::new("warmest reading", None)).await;
    assert_eq!(out.outcome, Outcome::Answered);
    assert!(model.prompt(2).contains("User: where is the float"));

    let entries = JsonlConversationLog::open(&path).entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].ai_response, out.response);
}
