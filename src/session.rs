use chrono::Local;
use log::{ error, info };
use uuid::Uuid;

use crate::feedback::FeedbackSink;
use crate::llm::chat::EndpointClient;
use crate::llm::GenerationParams;
use crate::models::chat::{ ChatMessage, Transcript };
use crate::models::feedback::{ FeedbackRecord, FeedbackValue };

pub const ERROR_PLACEHOLDER: &str = "Error retrieving response";
pub const FEEDBACK_RECEIVED: &str = "✔️ Feedback received!";

/// How the session talks to the serving endpoint.
#[derive(Debug, Clone, Copy)]
pub struct TurnOptions {
    /// Forward the full transcript rather than only the newest user message.
    pub send_history: bool,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Reply(String),
    /// The endpoint call failed; the placeholder was recorded in the transcript.
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Skipped,
    Received(String),
    Failed(String),
}

impl FeedbackOutcome {
    pub fn toast(&self) -> Option<&str> {
        match self {
            FeedbackOutcome::Skipped => None,
            FeedbackOutcome::Received(msg) | FeedbackOutcome::Failed(msg) => Some(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Exchange {
    prompt: String,
    response: String,
}

/// State owned by one connected chat client.
pub struct ChatSession {
    id: String,
    transcript: Transcript,
    feedback_widget: Option<FeedbackValue>,
    last_exchange: Option<Exchange>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transcript: Transcript::new(),
            feedback_widget: None,
            last_exchange: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Runs one chat turn. Returns `None` for empty input, which is not submitted.
    pub async fn handle_user_input(
        &mut self,
        input: &str,
        client: &dyn EndpointClient,
        options: &TurnOptions
    ) -> Option<TurnOutcome> {
        if input.trim().is_empty() {
            return None;
        }

        self.transcript.push(ChatMessage::user(input));
        // A new exchange invalidates any feedback left over from the previous one.
        self.feedback_widget = None;

        let request: Vec<ChatMessage> = if options.send_history {
            self.transcript.messages().to_vec()
        } else {
            vec![ChatMessage::user(input)]
        };

        let (response, outcome) = match client.complete(&request, &options.params).await {
            Ok(resp) => {
                info!("Session {}: received {} chars from '{}'", self.id, resp.response.len(), client.endpoint_name());
                (resp.response.clone(), TurnOutcome::Reply(resp.response))
            }
            Err(e) => {
                error!("Session {}: error querying model: {}", self.id, e);
                (
                    ERROR_PLACEHOLDER.to_string(),
                    TurnOutcome::Failed { message: format!("Error querying model: {}", e) },
                )
            }
        };

        self.transcript.push(ChatMessage::assistant(response.clone()));
        self.last_exchange = Some(Exchange { prompt: input.to_string(), response });
        Some(outcome)
    }

    /// Stores the current state of the feedback widget.
    pub fn set_feedback_widget(&mut self, value: Option<FeedbackValue>) {
        self.feedback_widget = value;
    }

    /// Consumes the widget state and pairs it with the latest exchange.
    pub fn take_feedback_record(&mut self) -> Option<FeedbackRecord> {
        let feedback = self.feedback_widget.take()?;
        let exchange = self.last_exchange.as_ref()?;
        Some(FeedbackRecord {
            timestamp: Local::now().naive_local(),
            user_message: exchange.prompt.clone(),
            assistant_message: exchange.response.clone(),
            feedback,
        })
    }

    /// Handles a feedback form submission. Failures become toasts and never touch the transcript.
    pub async fn submit_feedback(&mut self, sink: &dyn FeedbackSink) -> FeedbackOutcome {
        let Some(record) = self.take_feedback_record() else {
            return FeedbackOutcome::Skipped;
        };

        info!("Session {}: logging feedback via {}", self.id, sink.method());
        match sink.insert(&record).await {
            Ok(()) => FeedbackOutcome::Received(FEEDBACK_RECEIVED.to_string()),
            Err(e) => {
                error!("Session {}: feedback not logged: {}", self.id, e);
                FeedbackOutcome::Failed(
                    format!("X Feedback not received, error with feedback mechanism {}!", e)
                )
            }
        }
    }
}
