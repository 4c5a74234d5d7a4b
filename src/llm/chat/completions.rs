use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ bearer_http_client, post_json, CompletionResponse, EndpointClient };
use crate::llm::{ invocation_url, EndpointConfig, GenerationParams };
use crate::models::chat::ChatMessage;

/// Chat-style query: structured message list in, `choices[0].message.content` out.
pub struct ChatCompletionsClient {
    http: HttpClient,
    url: String,
    endpoint_name: String,
    system_prompt: Option<String>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    messages: Vec<&'a ChatMessage>,
    #[serde(flatten)]
    params: &'a GenerationParams,
}

#[derive(Deserialize)]
struct QueryResponse {
    choices: Vec<QueryChoice>,
}

#[derive(Deserialize)]
struct QueryChoice {
    message: QueryMessage,
}

#[derive(Deserialize)]
struct QueryMessage {
    content: String,
}

impl ChatCompletionsClient {
    pub fn new(
        workspace_url: &str,
        token: &str,
        endpoint_name: String,
        system_prompt: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Ok(Self {
            http: bearer_http_client(token)?,
            url: invocation_url(workspace_url, &endpoint_name),
            endpoint_name,
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(
            &config.workspace_url,
            &config.token,
            config.endpoint_name.clone(),
            config.system_prompt.clone()
        )
    }
}

#[async_trait]
impl EndpointClient for ChatCompletionsClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let system = self.system_prompt.as_ref().map(|p| ChatMessage::system(p.clone()));
        let req = QueryRequest {
            messages: system.iter().chain(messages.iter()).collect(),
            params,
        };

        info!("Querying serving endpoint '{}' with {} message(s)", self.endpoint_name, req.messages.len());
        let resp = post_json(&self.http, &self.url, &req).await?
            .json::<QueryResponse>()
            .await?;

        let content = resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| format!("No choices returned by serving endpoint '{}'", self.endpoint_name))?
            .message.content;

        Ok(CompletionResponse { response: content })
    }

    fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }
}
