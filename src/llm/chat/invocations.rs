use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::error::Error as StdError;

use super::{ bearer_http_client, post_json, CompletionResponse, EndpointClient };
use crate::llm::{ invocation_url, EndpointConfig, GenerationParams };
use crate::models::chat::ChatMessage;

/// Raw invocation: `{"messages": [...]}` in, JSON array out with the reply text at index 0.
pub struct RawInvocationClient {
    http: HttpClient,
    url: String,
    endpoint_name: String,
}

#[derive(Serialize)]
struct InvocationRequest<'a> {
    messages: &'a [ChatMessage],
}

impl RawInvocationClient {
    pub fn new(
        workspace_url: &str,
        token: &str,
        endpoint_name: String
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Ok(Self {
            http: bearer_http_client(token)?,
            url: invocation_url(workspace_url, &endpoint_name),
            endpoint_name,
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(&config.workspace_url, &config.token, config.endpoint_name.clone())
    }
}

fn first_text(body: &JsonValue) -> Option<String> {
    body.as_array()?.first()?.as_str().map(str::to_string)
}

#[async_trait]
impl EndpointClient for RawInvocationClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        info!("Invoking serving endpoint '{}' with {} message(s)", self.endpoint_name, messages.len());
        let body = post_json(&self.http, &self.url, &InvocationRequest { messages }).await?
            .json::<JsonValue>()
            .await?;

        let content = first_text(&body).ok_or_else(|| {
            format!("Unexpected response shape from serving endpoint '{}': {}", self.endpoint_name, body)
        })?;

        Ok(CompletionResponse { response: content })
    }

    fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }
}
