//! Helpers for building contexts, stores, and pipeline roots in tests.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for downstream integration tests.

use std::path::Path;

use anyhow::Result;
use tempfile::TempDir;

use crate::core::correlation::{CorrelationId, RoundScope};
use crate::core::record::{Record, RecordStore, Role};
use crate::core::request::{JudgeParams, SamplingParams};
use crate::io::layout::RoundContext;

pub const TEST_MODEL: &str = "test-model";

/// A round scope fixed to turn 1 so generated records already hold a turn.
pub fn scope() -> RoundScope {
    RoundScope::new("english", "test-run", TEST_MODEL, 1)
}

/// A complete round context rooted at `root`, initiator side, default sampling.
pub fn round_context(root: &Path) -> RoundContext {
    RoundContext::new(
        root,
        scope(),
        TEST_MODEL,
        Role::Initiator,
        SamplingParams::default(),
    )
}

/// The correlation id a request for record `index` carries under `ctx`.
pub fn custom_id(ctx: &RoundContext, index: usize) -> String {
    CorrelationId::new(&ctx.scope, index).encode()
}

/// A record with one opening turn, distinguished by its scene text.
pub fn record(scene: &str) -> Record {
    let mut record = Record {
        source: "seed.jsonl".to_string(),
        scene: scene.to_string(),
        lang: "english".to_string(),
        ..Record::default()
    };
    record.append_turn(Role::Responder, format!("opening line for {scene}"), TEST_MODEL);
    record
}

/// A store of `n` open records with distinct scenes.
pub fn store_of(n: usize) -> RecordStore {
    RecordStore::new((0..n).map(|i| record(&format!("scene {i}"))).collect())
}

pub fn judge_params() -> JudgeParams {
    JudgeParams {
        model: "test-judge".to_string(),
        temperature: 0.1,
        max_tokens: 64,
    }
}

/// A temporary pipeline root with a ready round context.
///
/// The directory is removed on drop, so keep the value alive for the whole
/// test.
pub struct TempPipeline {
    temp: TempDir,
    pub ctx: RoundContext,
}

impl TempPipeline {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let ctx = round_context(temp.path());
        Ok(Self { temp, ctx })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }
}
