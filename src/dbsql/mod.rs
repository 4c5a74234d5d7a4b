//! Client for the SQL warehouse statement execution API.
//!
//! Statements are submitted with `wait_timeout = "0s"`, so the warehouse runs
//! them asynchronously and the call returns as soon as a statement id exists.
//! Completion is never polled.

use log::info;
use reqwest::header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const STATEMENTS_ROUTE: &str = "/api/2.0/sql/statements/";

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Error executing SQL statement: {0}")]
    Status(String),
    #[error("SQL statement request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid token format: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: &'a str,
}

#[derive(Clone)]
pub struct StatementExecutor {
    http: HttpClient,
    host: String,
    warehouse_id: String,
}

impl StatementExecutor {
    pub fn new(host: &str, token: &str, warehouse_id: &str) -> Result<Self, StatementError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);

        let http = HttpClient::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            warehouse_id: warehouse_id.to_string(),
        })
    }

    pub fn warehouse_id(&self) -> &str {
        &self.warehouse_id
    }

    /// Submits `sql` and returns the decoded response body.
    pub async fn execute(&self, sql: &str) -> Result<JsonValue, StatementError> {
        let payload = StatementRequest {
            warehouse_id: &self.warehouse_id,
            statement: sql,
            wait_timeout: "0s",
        };

        let resp = self.http
            .post(format!("{}{}", self.host, STATEMENTS_ROUTE))
            .json(&payload)
            .send().await?;

        if resp.status() != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(StatementError::Status(body));
        }

        let response_data: JsonValue = resp.json().await?;

        match next_chunk_internal_link(&response_data) {
            Some(link) => info!("NEXT_CHUNK_INTERNAL_LINK={}", link),
            None => info!("No Chunk"),
        }
        info!("SQL_STATEMENT_ID={}", statement_id(&response_data).unwrap_or("<none>"));

        Ok(response_data)
    }
}

pub fn statement_id(response: &JsonValue) -> Option<&str> {
    response.get("statement_id").and_then(JsonValue::as_str)
}

pub fn next_chunk_internal_link(response: &JsonValue) -> Option<&str> {
    response
        .get("result")
        .and_then(|r| r.get("next_chunk_internal_link"))
        .and_then(JsonValue::as_str)
}

/// One-shot helper mirroring the executor for callers that do not keep a client around.
pub async fn execute_sql_statement(
    host: &str,
    token: &str,
    warehouse_id: &str,
    sql: &str
) -> Result<JsonValue, StatementError> {
    StatementExecutor::new(host, token, warehouse_id)?.execute(sql).await
}

pub fn create_feedback_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (timestamp timestamp, user_message string, assistant_message string, feedback string)",
        table
    )
}

pub async fn ensure_feedback_table(
    executor: &StatementExecutor,
    table: &str
) -> Result<JsonValue, StatementError> {
    info!("Ensuring feedback table {} exists on warehouse {}", table, executor.warehouse_id());
    executor.execute(&create_feedback_table_statement(table)).await
}
