//! Request builder: pure mapping from (record, round context) to requests.
//!
//! All file I/O stays in the orchestration layer; this module only turns a
//! record snapshot into a self-describing [`BatchRequest`] carrying a
//! correlation id. Prompt templates are embedded at compile time and
//! rendered with minijinja.

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};

use crate::core::correlation::{CorrelationId, RoundScope};
use crate::core::record::{Record, Role};
use crate::core::wire::{BatchRequest, ChatMessage, RequestBody, ResponseFormat};

const INITIATOR_SYSTEM: &str = include_str!("prompts/initiator.md");
const RESPONDER_SYSTEM: &str = include_str!("prompts/responder.md");
const JUDGE_SYSTEM: &str = include_str!("prompts/judge.md");
const NARRATOR_SYSTEM: &str = include_str!("prompts/narrator.md");
const NARRATIVE_JUDGE_SYSTEM: &str = include_str!("prompts/narrative_judge.md");
const QUALITY_REVIEW_SYSTEM: &str = include_str!("prompts/quality_review.md");
const ASSESS_CONTEXT_TEMPLATE: &str = include_str!("prompts/assess_context.md");
const TURN_CONTEXT_TEMPLATE: &str = include_str!("prompts/turn_context.md");
const EVAL_CONTEXT_TEMPLATE: &str = include_str!("prompts/eval_context.md");

const CHAT_COMPLETIONS_URL: &str = "/v1/chat/completions";

/// Sampling parameters passed through to request bodies untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_p: 0.95,
            frequency_penalty: 1.0,
            presence_penalty: 0.6,
            max_tokens: 512,
        }
    }
}

/// Evaluator request parameters (model and deliberately low temperature).
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A prior failed attempt plus the evaluator's explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub attempt: String,
    pub verdict: String,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("turn_context", TURN_CONTEXT_TEMPLATE)
            .expect("turn context template should be valid");
        env.add_template("eval_context", EVAL_CONTEXT_TEMPLATE)
            .expect("eval context template should be valid");
        env.add_template("assess_context", ASSESS_CONTEXT_TEMPLATE)
            .expect("assess context template should be valid");
        Self { env }
    }

    fn render_turn_context(&self, record: &Record, role: Role) -> Result<String> {
        let template = self.env.get_template("turn_context")?;
        // One transcript line per turn: newlines inside content are stripped.
        let rendered = template
            .render(context! {
                scene => &record.scene,
                transcript => record.transcript(true),
                role => role.wire_name(),
            })
            .context("render turn context")?;
        Ok(rendered)
    }

    fn render_assess_context(&self, record: &Record) -> Result<String> {
        let template = self.env.get_template("assess_context")?;
        let rendered = template
            .render(context! {
                lang => &record.lang,
                transcript => record.transcript(false),
            })
            .context("render assess context")?;
        Ok(rendered)
    }

    fn render_eval_context(&self, record: &Record, role: Role, candidate: &str) -> Result<String> {
        let template = self.env.get_template("eval_context")?;
        let rendered = template
            .render(context! {
                scene => &record.scene,
                transcript => record.transcript(false),
                role => role.wire_name(),
                candidate => candidate,
            })
            .context("render eval context")?;
        Ok(rendered)
    }
}

/// Builds generation, regeneration, and evaluation requests for one round.
pub struct RequestBuilder<'a> {
    scope: &'a RoundScope,
    model: &'a str,
    sampling: &'a SamplingParams,
    engine: PromptEngine,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(scope: &'a RoundScope, model: &'a str, sampling: &'a SamplingParams) -> Self {
        Self {
            scope,
            model,
            sampling,
            engine: PromptEngine::new(),
        }
    }

    /// Base message list for generating the next turn of `record`.
    ///
    /// Initiator requests carry the whole dialogue rendered into a single
    /// user message; responder requests replay the dialogue as chat turns.
    pub fn generation_messages(&self, record: &Record, role: Role) -> Result<Vec<ChatMessage>> {
        match role {
            Role::Initiator => Ok(vec![
                ChatMessage::system(INITIATOR_SYSTEM),
                ChatMessage::user(self.engine.render_turn_context(record, role)?),
            ]),
            Role::Responder => {
                let mut messages = vec![ChatMessage::system(RESPONDER_SYSTEM)];
                messages.extend(record.dialogue.iter().map(|turn| ChatMessage {
                    role: turn.role.wire_name().to_string(),
                    content: turn.content.clone(),
                }));
                Ok(messages)
            }
        }
    }

    /// Build the generation request for one record.
    pub fn generation_request(
        &self,
        index: usize,
        record: &Record,
        role: Role,
    ) -> Result<BatchRequest> {
        let id = CorrelationId::new(self.scope, index);
        let messages = self.generation_messages(record, role)?;
        Ok(self.chat_request(id.encode(), messages))
    }

    /// Build a regeneration request from the prior attempt's messages.
    ///
    /// The feedback paragraph is appended to the final user message, after
    /// the base context. Successive regeneration attempts therefore
    /// accumulate feedback instead of discarding it.
    pub fn regeneration_request(
        &self,
        custom_id: String,
        mut messages: Vec<ChatMessage>,
        role: Role,
        feedback: &Feedback,
    ) -> Result<BatchRequest> {
        let last = messages
            .last_mut()
            .ok_or_else(|| anyhow!("regeneration request '{custom_id}' has no base messages"))?;
        last.content.push_str(&format!(
            "Prior failed generation attempt was:\n{}:{}\nFeedback from this previous generation:{}\n",
            role.wire_name(),
            feedback.attempt,
            feedback.verdict
        ));
        Ok(self.chat_request(custom_id, messages))
    }

    /// Build the evaluation request for one generated response.
    ///
    /// The evaluation request reuses the response's correlation id so the
    /// verdict maps back to the same record.
    pub fn evaluation_request(
        &self,
        custom_id: String,
        record: &Record,
        role: Role,
        candidate: &str,
        judge: &JudgeParams,
    ) -> Result<BatchRequest> {
        let rendered = self.engine.render_eval_context(record, role, candidate)?;
        Ok(BatchRequest {
            custom_id,
            method: "POST".to_string(),
            url: CHAT_COMPLETIONS_URL.to_string(),
            body: RequestBody {
                model: judge.model.clone(),
                messages: vec![ChatMessage::system(JUDGE_SYSTEM), ChatMessage::user(rendered)],
                temperature: judge.temperature,
                top_p: 1.0,
                frequency_penalty: None,
                presence_penalty: None,
                max_tokens: judge.max_tokens,
                response_format: None,
            },
        })
    }

    /// Build the whole-dialogue quality review request for one record.
    ///
    /// The reviewer must answer as a JSON object, so the request pins
    /// `response_format` to `json_object`.
    pub fn assessment_request(
        &self,
        index: usize,
        record: &Record,
        judge: &JudgeParams,
    ) -> Result<BatchRequest> {
        let rendered = self.engine.render_assess_context(record)?;
        Ok(BatchRequest {
            custom_id: CorrelationId::new(self.scope, index).encode(),
            method: "POST".to_string(),
            url: CHAT_COMPLETIONS_URL.to_string(),
            body: RequestBody {
                model: judge.model.clone(),
                messages: vec![
                    ChatMessage::system(QUALITY_REVIEW_SYSTEM),
                    ChatMessage::user(rendered),
                ],
                temperature: judge.temperature,
                top_p: 1.0,
                frequency_penalty: None,
                presence_penalty: None,
                max_tokens: judge.max_tokens,
                response_format: Some(ResponseFormat::json_object()),
            },
        })
    }

    /// Build a turn-0 seed request from one narrative seed input.
    ///
    /// Seed rounds have no dialogue yet; the user message is the seed text
    /// itself plus the round's language. Regeneration in the seed round
    /// rebuilds from the same seed under the caller's correlation id.
    pub fn narrative_request(&self, custom_id: String, seed: &str) -> BatchRequest {
        let messages = vec![
            ChatMessage::system(NARRATOR_SYSTEM),
            ChatMessage::user(format!("{seed}\nLanguage/Culture: {}", self.scope.lang)),
        ];
        self.chat_request(custom_id, messages)
    }

    /// Build the compliance-check request for one seed response.
    pub fn narrative_evaluation_request(
        &self,
        custom_id: String,
        candidate: &str,
        judge: &JudgeParams,
    ) -> BatchRequest {
        BatchRequest {
            custom_id,
            method: "POST".to_string(),
            url: CHAT_COMPLETIONS_URL.to_string(),
            body: RequestBody {
                model: judge.model.clone(),
                messages: vec![
                    ChatMessage::system(NARRATIVE_JUDGE_SYSTEM),
                    ChatMessage::user(candidate),
                ],
                temperature: judge.temperature,
                top_p: 1.0,
                frequency_penalty: None,
                presence_penalty: None,
                max_tokens: judge.max_tokens,
                response_format: None,
            },
        }
    }

    fn chat_request(&self, custom_id: String, messages: Vec<ChatMessage>) -> BatchRequest {
        BatchRequest {
            custom_id,
            method: "POST".to_string(),
            url: CHAT_COMPLETIONS_URL.to_string(),
            body: RequestBody {
                model: self.model.to_string(),
                messages,
                temperature: self.sampling.temperature,
                top_p: self.sampling.top_p,
                frequency_penalty: Some(self.sampling.frequency_penalty),
                presence_penalty: Some(self.sampling.presence_penalty),
                max_tokens: self.sampling.max_tokens,
                response_format: None,
            },
        }
    }
}
