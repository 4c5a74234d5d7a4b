use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;

pub const DEFAULT_REWRITE_TEMPLATE: &str = "Below is the conversation so far between a writer and a copy assistant, followed by a new instruction. \
Merge the earlier draft and the new instruction into one revised draft that can be rewritten on its own. \
Return only the revised draft.\n\nConversation:\n{chat_history}\n\nNew instruction: {question}";

#[derive(Debug)]
pub enum ChainError {
    EmptyInput,
    MissingPlaceholder(String),
    Model(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::EmptyInput => write!(f, "Chain input contains no messages"),
            ChainError::MissingPlaceholder(name) =>
                write!(f, "Prompt template has no '{{{}}}' placeholder", name),
            ChainError::Model(msg) => write!(f, "Model invocation failed: {}", msg),
            ChainError::IoError(e) => write!(f, "Chain config IO error: {}", e),
            ChainError::JsonError(e) => write!(f, "Chain config JSON parsing error: {}", e),
        }
    }
}

impl Error for ChainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChainError::IoError(e) => Some(e),
            ChainError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err)
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LlmParameters {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmParameters {
    fn default() -> Self {
        Self { max_tokens: 5000, temperature: 0.01 }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChainConfig {
    /// Foundation model endpoint the chain calls.
    pub endpoint_name: String,
    /// System prompt; `{question}` is substituted with the (possibly rewritten) question.
    pub prompt_template: String,
    #[serde(default)]
    pub parameters: LlmParameters,
    #[serde(default = "default_rewrite_on_history")]
    pub rewrite_on_history: bool,
    #[serde(default = "default_rewrite_template")]
    pub rewrite_template: String,
    #[serde(default)]
    pub input_example: Option<JsonValue>,
}

fn default_rewrite_on_history() -> bool {
    true
}

fn default_rewrite_template() -> String {
    DEFAULT_REWRITE_TEMPLATE.to_string()
}

impl ChainConfig {
    fn validate(&self) -> Result<(), ChainError> {
        if self.rewrite_on_history {
            for name in ["chat_history", "question"] {
                if !self.rewrite_template.contains(&format!("{{{}}}", name)) {
                    return Err(ChainError::MissingPlaceholder(format!("rewrite_template:{}", name)));
                }
            }
        }
        Ok(())
    }
}

pub fn load_chain_config_from_str(json: &str) -> Result<Arc<ChainConfig>, ChainError> {
    let config: ChainConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(Arc::new(config))
}

pub fn load_chain_config(path: &str) -> Result<Arc<ChainConfig>, ChainError> {
    let file_content = fs::read_to_string(path)?;
    load_chain_config_from_str(&file_content)
}

/// Substitutes `{name}` placeholders in one pass over the template. Placeholders
/// without a value are left untouched and substituted text is never rescanned.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| values.iter().find(|(name, _)| *name == &after[..close]).map(|(_, v)| (close, *v)));

        match value {
            Some((close, v)) => {
                rendered.push_str(v);
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);
    rendered
}
