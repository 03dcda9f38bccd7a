//! Orchestration for `forge evaluate`: build the evaluation batch.
//!
//! Evaluates the most recent attempt: if a completed regeneration batch
//! exists for the round, those responses are judged; otherwise the original
//! generation responses are.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::info;

use crate::core::correlation::CorrelationId;
use crate::core::record::RecordStore;
use crate::core::request::{JudgeParams, RequestBuilder};
use crate::core::wire::BatchResponse;
use crate::io::batch::{read_jsonl, write_jsonl};
use crate::io::layout::RoundContext;

/// Which completed batch the evaluation was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationSource {
    Generation,
    Regeneration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluateOutcome {
    pub requests_written: usize,
    pub source: EvaluationSource,
    pub batch_path: PathBuf,
}

/// Build one evaluation request per completed response and write the
/// pending evaluation batch.
pub fn run_evaluate(
    ctx: &RoundContext,
    store: &RecordStore,
    judge: &JudgeParams,
) -> Result<EvaluateOutcome> {
    let regen_path = ctx.layout.completed_regeneration();
    let (input_path, source) = if regen_path.exists() {
        info!("regeneration responses found; evaluating those");
        (regen_path, EvaluationSource::Regeneration)
    } else {
        (ctx.layout.completed_generation(), EvaluationSource::Generation)
    };
    if !input_path.exists() {
        return Err(anyhow!(
            "missing completed batch {} (run the executor first)",
            input_path.display()
        ));
    }

    let responses: Vec<BatchResponse> = read_jsonl(&input_path)?;
    let builder = RequestBuilder::new(&ctx.scope, &ctx.model, &ctx.sampling);

    let mut requests = Vec::with_capacity(responses.len());
    for response in &responses {
        let id = CorrelationId::decode(&response.custom_id)?;
        let record = store.get(id.index).ok_or_else(|| {
            anyhow!(
                "response '{}' maps to record {} but the store has {} records",
                response.custom_id,
                id.index,
                store.len()
            )
        })?;
        let candidate = response.content()?;
        requests.push(builder.evaluation_request(
            response.custom_id.clone(),
            record,
            ctx.role,
            candidate,
            judge,
        )?);
    }

    let batch_path = ctx.layout.pending_evaluation();
    write_jsonl(&batch_path, &requests)?;
    info!(
        batch = %batch_path.display(),
        requests = requests.len(),
        "evaluation batch written"
    );
    Ok(EvaluateOutcome {
        requests_written: requests.len(),
        source,
        batch_path,
    })
}
