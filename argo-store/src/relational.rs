use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use argo_types::{ResultSet, RetryPolicy};
use async_trait::async_trait;
use datafusion::execution::context::SQLOptions;
use datafusion::prelude::{CsvReadOptions, SessionContext};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::convert::batches_to_result_set;
use crate::{DataError, ExecutionError, RelationalStore};

#[derive(Clone, Debug)]
pub struct DataFusionSettings {
    /// Directory holding `<table>.csv` for every catalog table.
    pub data_dir: PathBuf,
    /// Concurrent queries allowed; each query holds one permit for its duration.
    pub max_connections: usize,
    pub query_timeout: Duration,
    /// Applied to timeouts only; SQL errors are deterministic.
    pub retry: RetryPolicy,
}

impl Default for DataFusionSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("CleanData"),
            max_connections: 8,
            query_timeout: Duration::from_secs(30),
            retry: RetryPolicy::NONE,
        }
    }
}

/// Telemetry tables served by DataFusion from the ETL's CSV output.
pub struct DataFusionStore {
    ctx: SessionContext,
    permits: Arc<Semaphore>,
    query_timeout: Duration,
    retry: RetryPolicy,
    tables: Vec<String>,
}

fn read_only() -> SQLOptions {
    SQLOptions::new()
        .with_allow_ddl(false)
        .with_allow_dml(false)
        .with_allow_statements(false)
}

impl DataFusionStore {
    /// Register every catalog table found in `data_dir` and check it against its
    /// declaration. Missing files are skipped with a warning.
    pub async fn open(settings: DataFusionSettings) -> Result<Self, DataError> {
        let ctx = SessionContext::new();
        let mut tables = Vec::new();

        for def in argo_schema::catalog() {
            let path = settings.data_dir.join(format!("{}.csv", def.name));
            if !path.is_file() {
                warn!(table = def.name, path = %path.display(), "table file missing; not registered");
                continue;
            }
            let path_str = path
                .to_str()
                .ok_or_else(|| DataError::new(format!("non-utf8 path {}", path.display())))?;
            ctx.register_csv(def.name, path_str, CsvReadOptions::new())
                .await
                .map_err(|e| DataError::new(format!("register {}: {e}", def.name)))?;

            let provider = ctx
                .table_provider(def.name)
                .await
                .map_err(|e| DataError::new(format!("load {}: {e}", def.name)))?;
            def.check(provider.schema().as_ref())
                .map_err(|e| DataError::new(e.to_string()))?;

            info!(table = def.name, path = %path.display(), "registered table");
            tables.push(def.name.to_string());
        }

        Ok(Self {
            ctx,
            permits: Arc::new(Semaphore::new(settings.max_connections.max(1))),
            query_timeout: settings.query_timeout,
            retry: settings.retry,
            tables,
        })
    }

    /// Names of the tables that were registered.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    async fn execute_once(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        // The permit is the connection scope: released on drop, success or not.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExecutionError::Unavailable("connection pool closed".into()))?;

        let run = async {
            let df = self.ctx.sql_with_options(sql, read_only()).await?;
            let columns: Vec<String> = df
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect();
            let batches = df.collect().await?;
            Ok::<_, datafusion::error::DataFusionError>((columns, batches))
        };

        match tokio::time::timeout(self.query_timeout, run).await {
            Err(_) => Err(ExecutionError::Timeout(self.query_timeout)),
            Ok(Err(e)) => Err(ExecutionError::Sql(e.to_string())),
            Ok(Ok((columns, batches))) => batches_to_result_set(columns, &batches)
                .map_err(|e| ExecutionError::Sql(e.to_string())),
        }
    }
}

#[async_trait]
impl RelationalStore for DataFusionStore {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let sql = sql.trim().trim_end_matches(';').trim_end();
        let mut attempt = 0;
        loop {
            match self.execute_once(sql).await {
                Err(ExecutionError::Timeout(after)) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(?after, attempt, ?delay, "query timed out; retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
