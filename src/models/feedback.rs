use chrono::NaiveDateTime;
use serde::{ Serialize, Deserialize };
use std::fmt;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ThumbsUp,
    ThumbsDown,
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackKind::ThumbsUp => write!(f, "thumbs_up"),
            FeedbackKind::ThumbsDown => write!(f, "thumbs_down"),
        }
    }
}

/// State of the thumbs widget at the time the form is submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackValue {
    pub kind: FeedbackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl FeedbackValue {
    /// Rendering stored in the `feedback` column of the log table.
    pub fn to_column_string(&self) -> String {
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => format!("{}: {}", self.kind, text),
            _ => self.kind.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub timestamp: NaiveDateTime,
    pub user_message: String,
    pub assistant_message: String,
    pub feedback: FeedbackValue,
}

impl FeedbackRecord {
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}
