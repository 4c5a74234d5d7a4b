pub mod completions;
pub mod invocations;

use async_trait::async_trait;
use reqwest::header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use std::error::Error as StdError;
use std::sync::Arc;

use super::{ EndpointConfig, GenerationParams };
use crate::config::InvocationMode;
use crate::models::chat::ChatMessage;
use self::completions::ChatCompletionsClient;
use self::invocations::RawInvocationClient;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait EndpointClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn endpoint_name(&self) -> &str;
}

pub fn new_client(
    config: &EndpointConfig
) -> Result<Arc<dyn EndpointClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn EndpointClient> = match config.mode {
        InvocationMode::Chat => {
            let specific_client = ChatCompletionsClient::from_config(config)?;
            Arc::new(specific_client)
        }
        InvocationMode::Raw => {
            let specific_client = RawInvocationClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

pub(crate) fn bearer_http_client(token: &str) -> Result<HttpClient, Box<dyn StdError + Send + Sync>> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| format!("Invalid token format: {}", e))?
    );

    let http = HttpClient::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;
    Ok(http)
}

/// Sends the request and turns any non-2xx status into an error carrying the body.
pub(crate) async fn post_json<T: serde::Serialize + ?Sized>(
    http: &HttpClient,
    url: &str,
    body: &T
) -> Result<reqwest::Response, Box<dyn StdError + Send + Sync>> {
    let resp = http.post(url).json(body).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let err_body = resp.text().await.unwrap_or_default();
        return Err(format!("Serving endpoint returned {}: {}", status, err_body).into());
    }
    Ok(resp)
}
