//! Structured correlation ids binding batch requests to record indices.
//!
//! Every request in a batch carries a `custom_id` that a response echoes
//! back. The id is `{scope}-{index}`: an opaque round scope plus the stable
//! record index. Only the suffix after the **last** `-` is guaranteed
//! structure; callers must never parse the scope portion.

use std::fmt;

use anyhow::{Context, Result, anyhow};

/// Identifies one (language, run, model, turn) round.
///
/// Rendered into every correlation id so ids never collide across rounds
/// prepared for different languages, runs, models, or turn numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundScope {
    pub lang: String,
    pub run_id: String,
    /// Short model name (text after the last `/` of the model identifier).
    pub model: String,
    pub turn: u32,
}

impl RoundScope {
    pub fn new(lang: &str, run_id: &str, model: &str, turn: u32) -> Self {
        Self {
            lang: lang.to_string(),
            run_id: run_id.to_string(),
            model: short_model_name(model).to_string(),
            turn,
        }
    }
}

impl fmt::Display for RoundScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_turn-{}",
            self.lang, self.run_id, self.model, self.turn
        )
    }
}

/// Strip any provider namespace from a model identifier.
pub fn short_model_name(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

/// A decoded `custom_id`: opaque scope text plus the record index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId {
    pub scope: String,
    pub index: usize,
}

impl CorrelationId {
    pub fn new(scope: &RoundScope, index: usize) -> Self {
        Self {
            scope: scope.to_string(),
            index,
        }
    }

    /// Wire form: `{scope}-{index}`.
    pub fn encode(&self) -> String {
        format!("{}-{}", self.scope, self.index)
    }

    /// Decode a wire id by splitting on the last `-`.
    ///
    /// The scope half is kept opaque: the round scope itself contains `-`
    /// separators, so only the trailing index is structurally meaningful.
    pub fn decode(raw: &str) -> Result<Self> {
        let (scope, suffix) = raw
            .rsplit_once('-')
            .ok_or_else(|| anyhow!("correlation id '{raw}' has no '-' separator"))?;
        let index: usize = suffix
            .parse()
            .with_context(|| format!("correlation id '{raw}' has a non-numeric record index"))?;
        Ok(Self {
            scope: scope.to_string(),
            index,
        })
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scope, self.index)
    }
}
