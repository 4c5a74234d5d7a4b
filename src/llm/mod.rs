pub mod chat;

use crate::config::InvocationMode;
use serde::Serialize;

/// Sampling parameters forwarded to the endpoint. `None` fields are omitted from the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub mode: InvocationMode,
    pub workspace_url: String,
    pub token: String,
    pub endpoint_name: String,
    /// Prepended as a system message by chat-mode clients.
    pub system_prompt: Option<String>,
}

pub fn invocation_url(workspace_url: &str, endpoint_name: &str) -> String {
    format!(
        "{}/serving-endpoints/{}/invocations",
        workspace_url.trim_end_matches('/'),
        endpoint_name
    )
}
