//! Brand-tone chain: question extraction, optional history rewrite, system
//! prompt rendering, and one final model call whose text is returned as is.

use log::{ debug, info };
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use crate::config::chain::{ render_template, ChainConfig, ChainError };
use crate::llm::chat::EndpointClient;
use crate::llm::GenerationParams;
use crate::models::chat::ChatMessage;

/// Message as received by the chain. Roles are free-form so unknown ones can be dropped instead of rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainRequest {
    pub messages: Vec<ChainMessage>,
}

pub fn extract_user_query_string(messages: &[ChainMessage]) -> Option<&str> {
    messages.last().map(|m| m.content.as_str())
}

pub fn extract_chat_history(messages: &[ChainMessage]) -> &[ChainMessage] {
    match messages.split_last() {
        Some((_, history)) => history,
        None => &[],
    }
}

/// Keeps user and assistant turns; any other role is dropped.
pub fn format_chat_history(history: &[ChainMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(ChatMessage::user(m.content.clone())),
            "assistant" => Some(ChatMessage::assistant(m.content.clone())),
            _ => None,
        })
        .collect()
}

fn history_as_text(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            let speaker = if m.role == crate::models::chat::Role::User { "Human" } else { "AI" };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Chain {
    config: Arc<ChainConfig>,
    model: Arc<dyn EndpointClient>,
}

impl Chain {
    pub fn new(config: Arc<ChainConfig>, model: Arc<dyn EndpointClient>) -> Self {
        Self { config, model }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: Some(self.config.parameters.max_tokens),
            temperature: Some(self.config.parameters.temperature),
        }
    }

    async fn call_model(&self, messages: &[ChatMessage]) -> Result<String, ChainError> {
        let resp = self.model
            .complete(messages, &self.params()).await
            .map_err(|e| ChainError::Model(e.to_string()))?;
        Ok(resp.response)
    }

    async fn rewrite_question(&self, history: &[ChatMessage], question: &str) -> Result<String, ChainError> {
        let prompt = render_template(
            &self.config.rewrite_template,
            &[("chat_history", &history_as_text(history)), ("question", question)]
        );
        info!("Rewriting question against {} prior turn(s)", history.len());
        self.call_model(&[ChatMessage::user(prompt)]).await
    }

    pub async fn invoke(&self, messages: &[ChainMessage]) -> Result<String, ChainError> {
        let question = extract_user_query_string(messages).ok_or(ChainError::EmptyInput)?;
        let history = format_chat_history(extract_chat_history(messages));

        let rewrite = self.config.rewrite_on_history && !history.is_empty();
        let question = if rewrite {
            self.rewrite_question(&history, question).await?
        } else {
            question.to_string()
        };
        debug!("Chain question: {}", question);

        let system = render_template(&self.config.prompt_template, &[("question", &question)]);
        let mut prompt = Vec::with_capacity(history.len() + 2);
        prompt.push(ChatMessage::system(system));
        if !rewrite {
            prompt.extend(history);
        }
        prompt.push(ChatMessage::user(question));

        self.call_model(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::chain::load_chain_config_from_str;
    use crate::llm::chat::CompletionResponse;
    use crate::models::chat::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::error::Error as StdError;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EndpointClient for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _params: &GenerationParams
        ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
            self.calls.lock().unwrap().push(messages.to_vec());
            let reply = self.replies.lock().unwrap().pop_front().ok_or("no scripted reply")?;
            Ok(CompletionResponse { response: reply })
        }

        fn endpoint_name(&self) -> &str {
            "scripted"
        }
    }

    fn msg(role: &str, content: &str) -> ChainMessage {
        ChainMessage { role: role.into(), content: content.into() }
    }

    fn chain(model: Arc<ScriptedModel>, rewrite: bool) -> Chain {
        let config = load_chain_config_from_str(&format!(
            r#"{{"endpoint_name":"llm","prompt_template":"tone it: {{question}}","rewrite_on_history":{}}}"#,
            rewrite
        )).unwrap();
        Chain::new(config, model)
    }

    #[test]
    fn splits_question_and_history() {
        let messages = vec![msg("user", "a"), msg("assistant", "b"), msg("user", "c")];
        assert_eq!(extract_user_query_string(&messages), Some("c"));
        assert_eq!(extract_chat_history(&messages).len(), 2);
        assert!(extract_chat_history(&[]).is_empty());
    }

    #[test]
    fn unknown_roles_are_dropped() {
        let history = vec![msg("user", "a"), msg("tool", "x"), msg("system", "s"), msg("assistant", "b")];
        let formatted = format_chat_history(&history);
        assert_eq!(formatted, vec![ChatMessage::user("a"), ChatMessage::assistant("b")]);
    }

    #[tokio::test]
    async fn empty_history_skips_rewrite() {
        let model = ScriptedModel::new(&["polished"]);
        let reply = chain(model.clone(), true).invoke(&[msg("user", "raw copy")]).await.unwrap();

        assert_eq!(reply, "polished");
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], ChatMessage::system("tone it: raw copy"));
        assert_eq!(calls[0][1], ChatMessage::user("raw copy"));
    }

    #[tokio::test]
    async fn history_triggers_rewrite_then_generation() {
        let model = ScriptedModel::new(&["merged draft", "final copy"]);
        let messages = vec![
            msg("user", "first draft"),
            msg("assistant", "first answer"),
            msg("user", "add engineering details"),
        ];
        let reply = chain(model.clone(), true).invoke(&messages).await.unwrap();

        assert_eq!(reply, "final copy");
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        let rewrite_prompt = &calls[0][0].content;
        assert!(rewrite_prompt.contains("Human: first draft\nAI: first answer"));
        assert!(rewrite_prompt.contains("add engineering details"));
        assert_eq!(calls[1], vec![
            ChatMessage::system("tone it: merged draft"),
            ChatMessage::user("merged draft"),
        ]);
    }

    #[tokio::test]
    async fn rewrite_disabled_passes_history_through() {
        let model = ScriptedModel::new(&["final"]);
        let messages = vec![msg("user", "q1"), msg("assistant", "a1"), msg("user", "q2")];
        chain(model.clone(), false).invoke(&messages).await.unwrap();

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let roles: Vec<Role> = calls[0].iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let model = ScriptedModel::new(&[]);
        let result = chain(model.clone(), true).invoke(&[]).await;
        assert!(matches!(result, Err(ChainError::EmptyInput)));
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn model_failure_maps_to_chain_error() {
        let model = ScriptedModel::new(&[]);
        let result = chain(model, true).invoke(&[msg("user", "x")]).await;
        assert!(matches!(result, Err(ChainError::Model(_))));
    }
}
