use async_trait::async_trait;
use log::info;
use reqwest::header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::Serialize;

use super::{ FeedbackError, FeedbackSink };
use crate::config::LogMethod;
use crate::models::feedback::FeedbackRecord;

/// Inserts feedback rows through the hosted backend's REST table interface.
pub struct HostedTableSink {
    http: HttpClient,
    insert_url: String,
    table: String,
}

/// The timestamp column is left out so the backend's default fills it.
#[derive(Serialize)]
struct FeedbackRow<'a> {
    user_message: &'a str,
    assistant_response: &'a str,
    feedback: String,
}

impl HostedTableSink {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Result<Self, FeedbackError> {
        let invalid_key = |e: reqwest::header::InvalidHeaderValue| {
            FeedbackError::NotConfigured(format!("Invalid SUPABASE_KEY: {}", e))
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("prefer", HeaderValue::from_static("return=minimal"));
        headers.insert("apikey", HeaderValue::from_str(api_key).map_err(invalid_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(invalid_key)?
        );

        let http = HttpClient::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            insert_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            table: table.to_string(),
        })
    }
}

#[async_trait]
impl FeedbackSink for HostedTableSink {
    async fn insert(&self, record: &FeedbackRecord) -> Result<(), FeedbackError> {
        let row = FeedbackRow {
            user_message: &record.user_message,
            assistant_response: &record.assistant_message,
            feedback: record.feedback.to_column_string(),
        };

        info!("Logging feedback into hosted table {}", self.table);
        let resp = self.http.post(&self.insert_url).json(&row).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedbackError::Rejected { status: status.as_u16(), body });
        }
        Ok(())
    }

    fn method(&self) -> LogMethod {
        LogMethod::HostedTable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feedback::{ FeedbackKind, FeedbackValue };
    use mockito::Matcher;
    use serde_json::json;

    fn record() -> FeedbackRecord {
        FeedbackRecord {
            timestamp: chrono::Utc::now().naive_utc(),
            user_message: "draft".into(),
            assistant_message: "polished".into(),
            feedback: FeedbackValue { kind: FeedbackKind::ThumbsDown, text: Some("too long".into()) },
        }
    }

    #[tokio::test]
    async fn inserts_row_without_timestamp() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/feedback_log")
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer anon-key")
            .match_body(Matcher::Json(json!({
                "user_message": "draft",
                "assistant_response": "polished",
                "feedback": "thumbs_down: too long"
            })))
            .with_status(201)
            .expect(1)
            .create_async().await;

        let sink = HostedTableSink::new(&server.url(), "anon-key", "feedback_log").unwrap();
        sink.insert(&record()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_insert_reports_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/feedback_log")
            .with_status(401)
            .with_body(r#"{"message":"Invalid API key"}"#)
            .create_async().await;

        let sink = HostedTableSink::new(&server.url(), "bad", "feedback_log").unwrap();
        match sink.insert(&record()).await {
            Err(FeedbackError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
