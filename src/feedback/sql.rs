use async_trait::async_trait;
use log::info;

use super::{ FeedbackError, FeedbackSink };
use crate::config::LogMethod;
use crate::dbsql::StatementExecutor;
use crate::models::feedback::FeedbackRecord;

pub struct SqlWarehouseSink {
    executor: StatementExecutor,
    table: String,
}

impl SqlWarehouseSink {
    pub fn new(executor: StatementExecutor, table: String) -> Self {
        Self { executor, table }
    }
}

/// Swaps double quotes for single quotes so values fit inside the `"..."` literals.
pub fn escape_quotes(value: &str) -> String {
    value.replace('"', "'")
}

pub fn build_insert_statement(table: &str, record: &FeedbackRecord) -> String {
    format!(
        r#"INSERT INTO {} VALUES ("{}", "{}", "{}", "{}")"#,
        table,
        record.formatted_timestamp(),
        escape_quotes(&record.user_message),
        escape_quotes(&record.assistant_message),
        escape_quotes(&record.feedback.to_column_string())
    )
}

#[async_trait]
impl FeedbackSink for SqlWarehouseSink {
    async fn insert(&self, record: &FeedbackRecord) -> Result<(), FeedbackError> {
        let statement = build_insert_statement(&self.table, record);
        info!("Logging feedback into {} through warehouse {}", self.table, self.executor.warehouse_id());
        self.executor.execute(&statement).await?;
        Ok(())
    }

    fn method(&self) -> LogMethod {
        LogMethod::Dbsql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feedback::{ FeedbackKind, FeedbackValue, TIMESTAMP_FORMAT };
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;

    fn record(user: &str, assistant: &str, text: Option<&str>) -> FeedbackRecord {
        FeedbackRecord {
            timestamp: NaiveDateTime::parse_from_str("2024-06-01 12:30:00", TIMESTAMP_FORMAT).unwrap(),
            user_message: user.into(),
            assistant_message: assistant.into(),
            feedback: FeedbackValue { kind: FeedbackKind::ThumbsUp, text: text.map(str::to_string) },
        }
    }

    #[test]
    fn double_quotes_become_single_quotes() {
        assert_eq!(escape_quotes(r#"say "hi""#), "say 'hi'");

        let statement = build_insert_statement("main.app.feedback_log", &record(r#"say "hi""#, "ok", None));
        assert!(statement.contains("\"say 'hi'\""));
        assert!(!statement.contains(r#"say "hi""#));
    }

    #[test]
    fn insert_statement_layout() {
        let statement = build_insert_statement(
            "main.app.feedback_log",
            &record("draft", r#"the "final" copy"#, Some(r#"liked the "tone""#))
        );
        assert_eq!(
            statement,
            r#"INSERT INTO main.app.feedback_log VALUES ("2024-06-01 12:30:00", "draft", "the 'final' copy", "thumbs_up: liked the 'tone'")"#
        );
    }
}
