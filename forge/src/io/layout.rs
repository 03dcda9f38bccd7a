//! Round artifact layout and the per-round context value object.
//!
//! Every operation receives an explicit [`RoundContext`]; no path state is
//! threaded through ambient globals. Artifacts live under two mirrored
//! trees: pending request batches under `batches_to_process/` and executor
//! output under `completed_batches/`, keyed by `{lang}/{run_id}/{model}`.

use std::path::{Path, PathBuf};

use crate::core::correlation::RoundScope;
use crate::core::record::Role;
use crate::core::request::SamplingParams;

const PENDING_DIR: &str = "batches_to_process";
const COMPLETED_DIR: &str = "completed_batches";

/// Resolved artifact paths for one round scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    pending_dir: PathBuf,
    completed_dir: PathBuf,
    base_name: String,
}

impl BatchLayout {
    pub fn new(root: &Path, scope: &RoundScope) -> Self {
        let rel: PathBuf = [&scope.lang, &scope.run_id, &scope.model].iter().collect();
        Self {
            pending_dir: root.join(PENDING_DIR).join(&rel),
            completed_dir: root.join(COMPLETED_DIR).join(&rel),
            base_name: format!("turn-{}_{}", scope.turn, scope.model),
        }
    }

    pub fn pending_generation(&self) -> PathBuf {
        self.pending_dir.join(format!("{}.jsonl", self.base_name))
    }

    pub fn completed_generation(&self) -> PathBuf {
        self.completed_dir.join(format!("{}.jsonl", self.base_name))
    }

    pub fn pending_evaluation(&self) -> PathBuf {
        self.pending_dir
            .join(format!("{}_eval.jsonl", self.base_name))
    }

    pub fn completed_evaluation(&self) -> PathBuf {
        self.completed_dir
            .join(format!("{}_eval.jsonl", self.base_name))
    }

    pub fn pending_regeneration(&self) -> PathBuf {
        self.pending_dir
            .join(format!("{}_regen.jsonl", self.base_name))
    }

    pub fn completed_regeneration(&self) -> PathBuf {
        self.completed_dir
            .join(format!("{}_regen.jsonl", self.base_name))
    }

    /// Store-wide quality review batch, keyed to the round scope like the
    /// other artifacts.
    pub fn pending_assessment(&self) -> PathBuf {
        self.pending_dir
            .join(format!("{}_assess.jsonl", self.base_name))
    }
}

/// Everything one round operation needs: scope, role, model, sampling, paths.
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub scope: RoundScope,
    /// Full model identifier as sent in request bodies.
    pub model: String,
    pub role: Role,
    pub sampling: SamplingParams,
    pub layout: BatchLayout,
}

impl RoundContext {
    pub fn new(
        root: &Path,
        scope: RoundScope,
        model: &str,
        role: Role,
        sampling: SamplingParams,
    ) -> Self {
        let layout = BatchLayout::new(root, &scope);
        Self {
            scope,
            model: model.to_string(),
            role,
            sampling,
            layout,
        }
    }
}
