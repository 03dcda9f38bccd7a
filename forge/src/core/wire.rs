//! Wire schema for request/response batch files.
//!
//! This is the sole contract with the external batch executor: each line of
//! a request batch is a [`BatchRequest`], each line of a response batch is a
//! [`BatchResponse`] echoing the request's `custom_id`. Responses may appear
//! in any order; consumers key by correlation id, never by line position.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// A chat message in a request body or response choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion parameters passed through to the executor untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Output-shape constraint forwarded to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

/// One request line of a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

/// One response line of a completed batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub custom_id: String,
    pub response: ResponsePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub body: ResponseBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

impl BatchResponse {
    /// The generated text: content of the first choice's message.
    pub fn content(&self) -> Result<&str> {
        self.response
            .body
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| anyhow!("response '{}' has no choices", self.custom_id))
    }

    /// Overwrite the generated text in place (used to supersede bad output).
    pub fn set_content(&mut self, text: &str) -> Result<()> {
        let choice = self
            .response
            .body
            .choices
            .first_mut()
            .ok_or_else(|| anyhow!("response '{}' has no choices", self.custom_id))?;
        choice.message.content = text.to_string();
        Ok(())
    }
}

/// Build a response value (assistant role, single choice) for a custom id.
#[cfg(any(test, feature = "test-support"))]
pub fn completion(custom_id: impl Into<String>, text: impl Into<String>) -> BatchResponse {
    BatchResponse {
        custom_id: custom_id.into(),
        response: ResponsePayload {
            body: ResponseBody {
                model: None,
                choices: vec![Choice {
                    message: ChatMessage {
                        role: "assistant".to_string(),
                        content: text.into(),
                    },
                }],
            },
            prompt: None,
        },
    }
}
