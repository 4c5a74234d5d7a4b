use serde::{ Serialize, Deserialize };
use super::feedback::FeedbackValue;

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    /// Submission of the feedback form. `feedback` is null when the widget was left untouched.
    #[serde(rename = "feedback")] Feedback {
        #[serde(default)]
        feedback: Option<FeedbackValue>,
    },
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "response")] Response {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "toast")] Toast {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
}
