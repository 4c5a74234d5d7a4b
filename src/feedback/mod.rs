mod hosted;
mod sql;

pub use hosted::HostedTableSink;
pub use sql::{ build_insert_statement, escape_quotes, SqlWarehouseSink };

use async_trait::async_trait;
use log::{ info, warn };
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::config::{ workspace_url, LogMethod };
use crate::dbsql::{ StatementError, StatementExecutor };
use crate::models::feedback::FeedbackRecord;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error(transparent)]
    Statement(#[from] StatementError),
    #[error("hosted table insert failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hosted table returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("{0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn insert(&self, record: &FeedbackRecord) -> Result<(), FeedbackError>;

    fn method(&self) -> LogMethod;
}

/// Stands in for a sink whose settings were incomplete at startup; every insert fails.
pub struct UnconfiguredSink {
    method: LogMethod,
    reason: String,
}

#[async_trait]
impl FeedbackSink for UnconfiguredSink {
    async fn insert(&self, _record: &FeedbackRecord) -> Result<(), FeedbackError> {
        Err(FeedbackError::NotConfigured(self.reason.clone()))
    }

    fn method(&self) -> LogMethod {
        self.method
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, FeedbackError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FeedbackError::NotConfigured(format!("{} must be set", name)))
}

pub fn create_feedback_sink(args: &Args) -> Result<Arc<dyn FeedbackSink>, FeedbackError> {
    let table = required(&args.chat_log_table, "CHAT_LOG_TABLE")?;

    match LogMethod::parse(&args.log_method) {
        LogMethod::Dbsql => {
            let host = workspace_url(
                args.full_databricks_host.as_deref(),
                args.databricks_host.as_deref()
            ).ok_or_else(|| FeedbackError::NotConfigured("FULL_DATABRICKS_HOST must be set".into()))?;
            let warehouse_id = required(&args.warehouse_id, "DATABRICKS_WAREHOUSE_ID_VALUE")?;
            let executor = StatementExecutor::new(&host, &args.databricks_token, warehouse_id)?;
            Ok(Arc::new(SqlWarehouseSink::new(executor, table.to_string())))
        }
        LogMethod::HostedTable => {
            let url = required(&args.supabase_url, "SUPABASE_URL")?;
            let key = required(&args.supabase_key, "SUPABASE_KEY")?;
            Ok(Arc::new(HostedTableSink::new(url, key, table)?))
        }
    }
}

/// Builds the configured sink, degrading to an [`UnconfiguredSink`] so a bad
/// feedback setup only surfaces when someone submits feedback.
pub fn initialize_feedback_sink(args: &Args) -> Arc<dyn FeedbackSink> {
    let method = LogMethod::parse(&args.log_method);
    match create_feedback_sink(args) {
        Ok(sink) => {
            info!(
                "Feedback will be logged via {} into {}",
                method,
                args.chat_log_table.as_deref().unwrap_or_default()
            );
            sink
        }
        Err(e) => {
            warn!("Feedback logging via {} is not usable: {}", method, e);
            Arc::new(UnconfiguredSink { method, reason: e.to_string() })
        }
    }
}
